//! Application configuration management

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port
    pub port: u16,

    /// SQLite database path
    pub database_path: String,

    /// Netscape- or JSON-format cookie file for authenticated sessions
    pub cookies_path: PathBuf,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let port = env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .context("PORT must be a valid port number")?;

        let database_path =
            env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/followarr.db".to_string());

        let cookies_path = env::var("COOKIES_PATH")
            .unwrap_or_else(|_| "./data/cookies.txt".to_string())
            .into();

        Ok(Self {
            port,
            database_path,
            cookies_path,
        })
    }
}

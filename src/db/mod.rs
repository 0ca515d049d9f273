//! Database connection and repositories

pub mod performers;
pub mod schema;
pub mod settings;
pub mod sqlite_helpers;
pub mod videos;

use std::str::FromStr;

use anyhow::Result;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

pub use performers::{CreatePerformer, PerformerRecord, PerformerRepository, UpdatePerformer};
pub use settings::{SettingRecord, SettingsRepository};
pub use videos::{VideoRecord, VideoRepository, VideoStatus};

/// Database wrapper providing connection pool access
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if missing) the SQLite database at `path` and bring
    /// the schema up to date.
    pub async fn connect(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;

        schema::sync(&pool).await?;
        Ok(Self { pool })
    }

    /// In-memory database for tests
    pub async fn connect_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        // A single connection keeps the in-memory database alive and shared.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        schema::sync(&pool).await?;
        Ok(Self { pool })
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Get a performer repository
    pub fn performers(&self) -> PerformerRepository {
        PerformerRepository::new(self.pool.clone())
    }

    /// Get a video repository
    pub fn videos(&self) -> VideoRepository {
        VideoRepository::new(self.pool.clone())
    }

    /// Get a settings repository
    pub fn settings(&self) -> SettingsRepository {
        SettingsRepository::new(self.pool.clone())
    }
}

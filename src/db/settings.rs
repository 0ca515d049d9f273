//! Application settings database operations
//!
//! A flat key→value text store read through on every scan. Volume is tiny,
//! so there is no caching layer.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::db::sqlite_helpers::now_iso8601;

/// A setting row
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SettingRecord {
    pub key: String,
    pub value: Option<String>,
}

pub struct SettingsRepository {
    pool: SqlitePool,
}

impl SettingsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a setting's value, None when unset or empty
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let value: Option<(Option<String>,)> =
            sqlx::query_as("SELECT value FROM app_settings WHERE key = ?1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(value.and_then(|(v,)| v).filter(|v| !v.is_empty()))
    }

    /// Get a boolean setting, using `default` when unset
    pub async fn get_bool(&self, key: &str, default: bool) -> Result<bool> {
        Ok(match self.get(key).await? {
            Some(v) => v == "true" || v == "1",
            None => default,
        })
    }

    pub async fn list_all(&self) -> Result<Vec<SettingRecord>> {
        let records =
            sqlx::query_as::<_, SettingRecord>("SELECT key, value FROM app_settings ORDER BY key")
                .fetch_all(&self.pool)
                .await?;
        Ok(records)
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO app_settings (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (key) DO UPDATE SET value = ?2, updated_at = ?3
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(now_iso8601())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Resolve the download directory for a site: the per-site override when
    /// set, otherwise the global `download_path`.
    pub async fn download_path_for(&self, site: &str) -> Result<Option<String>> {
        if let Some(path) = self.get(&format!("download_path_{}", site)).await? {
            return Ok(Some(path));
        }
        self.get("download_path").await
    }
}

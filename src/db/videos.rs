//! Video database repository
//!
//! Status transitions happen inside the reconciliation engine's transaction;
//! this repository only covers the user-facing operations (listing,
//! ignore/unignore, the downloader's final status flip).

use anyhow::Result;
use sqlx::SqlitePool;
use thiserror::Error;

use crate::db::sqlite_helpers::{json_to_list, str_to_datetime};

/// Lifecycle state of a tracked video
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoStatus {
    New,
    Downloaded,
    Ignored,
}

impl VideoStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Downloaded => "downloaded",
            Self::Ignored => "ignored",
        }
    }

    pub fn parse(s: &str) -> Result<Self, InvalidVideoStatus> {
        match s {
            "new" => Ok(Self::New),
            "downloaded" => Ok(Self::Downloaded),
            "ignored" => Ok(Self::Ignored),
            other => Err(InvalidVideoStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown video status '{0}'")]
pub struct InvalidVideoStatus(String);

/// A discovered video belonging to one performer
#[derive(Debug, Clone)]
pub struct VideoRecord {
    pub id: i64,
    pub performer_id: String,
    pub title: String,
    pub url: String,
    /// Platform-scoped dedup and existence-search key
    pub viewkey: String,
    pub published: Option<String>,
    pub duration: Option<String>,
    /// Alternate identifiers for platforms whose canonical key is unstable
    pub media_ids: Vec<String>,
    pub status: VideoStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for VideoRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        let status_str: String = row.try_get("status")?;
        let media_ids_str: Option<String> = row.try_get("media_ids")?;
        let created_str: String = row.try_get("created_at")?;

        Ok(Self {
            id: row.try_get("id")?,
            performer_id: row.try_get("performer_id")?,
            title: row.try_get("title")?,
            url: row.try_get("url")?,
            viewkey: row.try_get("viewkey")?,
            published: row.try_get("published")?,
            duration: row.try_get("duration")?,
            media_ids: json_to_list(media_ids_str.as_deref()),
            status: VideoStatus::parse(&status_str).map_err(|e| sqlx::Error::Decode(e.into()))?,
            created_at: str_to_datetime(&created_str).map_err(|e| sqlx::Error::Decode(e.into()))?,
        })
    }
}

pub struct VideoRepository {
    pool: SqlitePool,
}

impl VideoRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: i64) -> Result<Option<VideoRecord>> {
        let record = sqlx::query_as::<_, VideoRecord>("SELECT * FROM videos WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    pub async fn list_for_performer(&self, performer_id: &str) -> Result<Vec<VideoRecord>> {
        let records = sqlx::query_as::<_, VideoRecord>(
            "SELECT * FROM videos WHERE performer_id = ?1 ORDER BY created_at DESC, id DESC",
        )
        .bind(performer_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    pub async fn list_by_status(
        &self,
        performer_id: &str,
        status: VideoStatus,
    ) -> Result<Vec<VideoRecord>> {
        let records = sqlx::query_as::<_, VideoRecord>(
            "SELECT * FROM videos WHERE performer_id = ?1 AND status = ?2 ORDER BY id",
        )
        .bind(performer_id)
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    /// Flip a video's status. Meant for the explicit user transitions
    /// (ignore/unignore) and the downloader's `downloaded` mark.
    pub async fn set_status(&self, id: i64, status: VideoStatus) -> Result<bool> {
        let result = sqlx::query("UPDATE videos SET status = ?2 WHERE id = ?1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

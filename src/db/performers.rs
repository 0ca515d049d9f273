//! Performer database repository

use anyhow::Result;
use sqlx::SqlitePool;

use crate::db::sqlite_helpers::{
    bool_to_int, int_to_bool, now_iso8601, str_to_datetime, str_to_datetime_opt,
};
use crate::sources::Site;

/// A tracked creator identity on one platform
#[derive(Debug, Clone)]
pub struct PerformerRecord {
    /// Platform-scoped identity key (channel id, user slug, handle)
    pub id: String,
    pub name: String,
    pub site: Site,
    /// Platform subtype; selects the URL template / listing the adapter uses
    pub kind: String,
    /// Comma-separated keyword lists, merged with the global lists at scan time
    pub blacklist_keywords: Option<String>,
    pub whitelist_keywords: Option<String>,
    /// Minimum duration in minutes, 0 = disabled
    pub min_duration: i32,
    pub scheduled_scan_enabled: bool,
    pub auto_download: bool,
    pub use_auth_session: bool,
    pub last_scan: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for PerformerRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        let site_str: String = row.try_get("site")?;
        let scheduled_int: i32 = row.try_get("scheduled_scan_enabled")?;
        let auto_int: i32 = row.try_get("auto_download")?;
        let auth_int: i32 = row.try_get("use_auth_session")?;
        let last_scan_str: Option<String> = row.try_get("last_scan")?;
        let created_str: String = row.try_get("created_at")?;

        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            site: site_str
                .parse()
                .map_err(|e: crate::sources::UnknownSite| sqlx::Error::Decode(e.into()))?,
            kind: row.try_get("kind")?,
            blacklist_keywords: row.try_get("blacklist_keywords")?,
            whitelist_keywords: row.try_get("whitelist_keywords")?,
            min_duration: row.try_get("min_duration")?,
            scheduled_scan_enabled: int_to_bool(scheduled_int),
            auto_download: int_to_bool(auto_int),
            use_auth_session: int_to_bool(auth_int),
            last_scan: str_to_datetime_opt(last_scan_str.as_deref())
                .map_err(|e| sqlx::Error::Decode(e.into()))?,
            created_at: str_to_datetime(&created_str).map_err(|e| sqlx::Error::Decode(e.into()))?,
        })
    }
}

/// Fields for creating a performer
#[derive(Debug, Clone)]
pub struct CreatePerformer {
    pub id: String,
    pub name: String,
    pub site: Site,
    pub kind: String,
}

/// Settings a user may edit on an existing performer
#[derive(Debug, Clone, Default)]
pub struct UpdatePerformer {
    pub name: Option<String>,
    pub blacklist_keywords: Option<String>,
    pub whitelist_keywords: Option<String>,
    pub min_duration: Option<i32>,
    pub scheduled_scan_enabled: Option<bool>,
    pub auto_download: Option<bool>,
    pub use_auth_session: Option<bool>,
}

pub struct PerformerRepository {
    pool: SqlitePool,
}

impl PerformerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: &str) -> Result<Option<PerformerRecord>> {
        let record =
            sqlx::query_as::<_, PerformerRecord>("SELECT * FROM performers WHERE id = ?1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(record)
    }

    pub async fn list_all(&self) -> Result<Vec<PerformerRecord>> {
        let records =
            sqlx::query_as::<_, PerformerRecord>("SELECT * FROM performers ORDER BY name")
                .fetch_all(&self.pool)
                .await?;
        Ok(records)
    }

    /// Performers eligible for the periodic scan
    pub async fn list_scheduled(&self) -> Result<Vec<PerformerRecord>> {
        let records = sqlx::query_as::<_, PerformerRecord>(
            "SELECT * FROM performers WHERE scheduled_scan_enabled = 1 ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    pub async fn create(&self, input: CreatePerformer) -> Result<PerformerRecord> {
        sqlx::query(
            r#"
            INSERT INTO performers (id, name, site, kind, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&input.id)
        .bind(&input.name)
        .bind(input.site.as_str())
        .bind(&input.kind)
        .bind(now_iso8601())
        .execute(&self.pool)
        .await?;

        self.get(&input.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve performer after insert"))
    }

    pub async fn update(&self, id: &str, input: UpdatePerformer) -> Result<Option<PerformerRecord>> {
        let Some(current) = self.get(id).await? else {
            return Ok(None);
        };

        sqlx::query(
            r#"
            UPDATE performers SET
                name = ?2,
                blacklist_keywords = ?3,
                whitelist_keywords = ?4,
                min_duration = ?5,
                scheduled_scan_enabled = ?6,
                auto_download = ?7,
                use_auth_session = ?8
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(input.name.unwrap_or(current.name))
        .bind(input.blacklist_keywords.or(current.blacklist_keywords))
        .bind(input.whitelist_keywords.or(current.whitelist_keywords))
        .bind(input.min_duration.unwrap_or(current.min_duration))
        .bind(bool_to_int(
            input
                .scheduled_scan_enabled
                .unwrap_or(current.scheduled_scan_enabled),
        ))
        .bind(bool_to_int(
            input.auto_download.unwrap_or(current.auto_download),
        ))
        .bind(bool_to_int(
            input.use_auth_session.unwrap_or(current.use_auth_session),
        ))
        .execute(&self.pool)
        .await?;

        self.get(id).await
    }

    /// Delete a performer and, via the FK cascade, all of its videos
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM performers WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

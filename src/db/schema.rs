//! Startup schema synchronization
//!
//! Runs idempotent DDL against the SQLite database. There is no migration
//! history table; columns are only ever added, never renamed or retyped.

use anyhow::Result;
use sqlx::SqlitePool;
use tracing::{debug, info};

const TABLES: &[(&str, &str)] = &[
    (
        "performers",
        r#"
        CREATE TABLE IF NOT EXISTS performers (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            site TEXT NOT NULL,
            kind TEXT NOT NULL,
            blacklist_keywords TEXT,
            whitelist_keywords TEXT,
            min_duration INTEGER NOT NULL DEFAULT 0,
            scheduled_scan_enabled INTEGER NOT NULL DEFAULT 1,
            auto_download INTEGER NOT NULL DEFAULT 0,
            use_auth_session INTEGER NOT NULL DEFAULT 0,
            last_scan TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    ),
    (
        "videos",
        r#"
        CREATE TABLE IF NOT EXISTS videos (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            performer_id TEXT NOT NULL REFERENCES performers(id) ON DELETE CASCADE,
            title TEXT NOT NULL,
            url TEXT NOT NULL,
            viewkey TEXT NOT NULL,
            published TEXT,
            duration TEXT,
            media_ids TEXT,
            status TEXT NOT NULL DEFAULT 'new',
            created_at TEXT NOT NULL,
            UNIQUE (performer_id, viewkey)
        )
        "#,
    ),
    (
        "app_settings",
        r#"
        CREATE TABLE IF NOT EXISTS app_settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TEXT NOT NULL
        )
        "#,
    ),
];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_videos_performer_status ON videos (performer_id, status)",
];

/// Bring the schema up to date. Safe to call on every startup.
pub async fn sync(pool: &SqlitePool) -> Result<()> {
    for (name, ddl) in TABLES {
        sqlx::query(ddl).execute(pool).await?;
        debug!(table = name, "Schema table ensured");
    }
    for ddl in INDEXES {
        sqlx::query(ddl).execute(pool).await?;
    }

    info!(tables = TABLES.len(), "Database schema synchronized");
    Ok(())
}

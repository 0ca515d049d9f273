//! Per-performer scan and state reconciliation
//!
//! One scan merges three unreliable sources of truth: the platform's
//! current listing, the local download tree, and the external library.
//! The pass is read-only until the end; every status change and insert is
//! collected into a mutation batch and committed in a single transaction,
//! so a failure mid-scan leaves no partial state behind.
//!
//! Ordering is strict: existing `new` records are re-evaluated first, then
//! existing `downloaded` records, then the freshly discovered listing is
//! merged. A record created by the merge step is never re-evaluated within
//! the same pass.

use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::db::{Database, PerformerRecord, VideoStatus};
use crate::db::sqlite_helpers::{list_to_json, now_iso8601};
use crate::services::downloader::performer_dir;
use crate::services::existence::{
    Existence, ExistenceKeys, ExistenceOracle, local_index_for,
};
use crate::services::filters::FilterRules;
use crate::services::library::LibraryClient;
use crate::sources::{DiscoveredVideo, ProgressSink, VideoSource};

/// What one scan did, returned to the caller for auto-download cascade
#[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize)]
pub struct ScanOutcome {
    pub new_count: usize,
    pub total_found: usize,
    pub new_video_ids: Vec<i64>,
}

enum Mutation {
    SetStatus {
        id: i64,
        status: VideoStatus,
    },
    Insert {
        video: DiscoveredVideo,
        status: VideoStatus,
    },
}

/// Run a full scan for one performer.
pub async fn scan_performer(
    db: &Database,
    source: &dyn VideoSource,
    performer_id: &str,
    progress: &dyn ProgressSink,
) -> Result<ScanOutcome> {
    let performer = db
        .performers()
        .get(performer_id)
        .await?
        .with_context(|| format!("Performer {} not found", performer_id))?;

    progress.progress(10, format!("Starting scan for {}", performer.name));
    info!(performer_id, name = %performer.name, site = performer.site.as_str(), "Scan started");

    let listing = source.discover(&performer, progress).await;
    if let Some(error) = &listing.error {
        if listing.videos.is_empty() {
            anyhow::bail!("Discovery failed for {}: {}", performer.name, error);
        }
        warn!(
            performer_id,
            error = %error,
            collected = listing.videos.len(),
            "Discovery incomplete; reconciling partial listing"
        );
    }
    let total_found = listing.videos.len();
    progress.progress(50, format!("Processing {} videos", total_found));

    let settings = db.settings();
    let rules = FilterRules::compile(
        &performer,
        settings.get("blacklist").await?.as_deref(),
        settings.get("whitelist").await?.as_deref(),
    );
    let oracle = build_oracle(db, &performer).await?;

    let existing = db.videos().list_for_performer(performer_id).await?;
    let mut seen_keys: HashSet<String> = existing.iter().map(|v| v.viewkey.clone()).collect();

    // Split the work up front so progress can be apportioned over it
    let fresh: Vec<&DiscoveredVideo> = listing
        .videos
        .iter()
        .filter(|v| seen_keys.insert(v.viewkey.clone()))
        .collect();
    let revert_enabled = oracle.any_check_enabled();
    let work_total = existing.len() + fresh.len();
    let mut work_done = 0usize;
    let report = |done: usize, text: &str| {
        let pct = 50 + (40 * done / work_total.max(1)) as u8;
        progress.progress(pct, text.to_string());
    };

    let mut mutations: Vec<Mutation> = Vec::new();

    // Existing `new` records: rules may have changed since creation
    for video in existing.iter().filter(|v| v.status == VideoStatus::New) {
        if !rules.is_allowed(&video.title, video.duration.as_deref()) {
            debug!(video_id = video.id, title = %video.title, "Filtered out, ignoring");
            mutations.push(Mutation::SetStatus {
                id: video.id,
                status: VideoStatus::Ignored,
            });
        } else {
            let keys = ExistenceKeys {
                url: &video.url,
                viewkey: &video.viewkey,
                media_ids: &video.media_ids,
                title: &video.title,
            };
            if oracle.probe(&keys).await == Existence::Present {
                mutations.push(Mutation::SetStatus {
                    id: video.id,
                    status: VideoStatus::Downloaded,
                });
            }
        }
        work_done += 1;
        report(work_done, "Re-checking pending videos");
    }

    // Existing `downloaded` records: revert when every enabled check says
    // the file is gone. Skipped entirely when no check is enabled.
    for video in existing
        .iter()
        .filter(|v| v.status == VideoStatus::Downloaded)
    {
        if revert_enabled {
            let keys = ExistenceKeys {
                url: &video.url,
                viewkey: &video.viewkey,
                media_ids: &video.media_ids,
                title: &video.title,
            };
            if oracle.probe(&keys).await == Existence::Absent {
                info!(video_id = video.id, title = %video.title, "Downloaded file gone, reverting to new");
                mutations.push(Mutation::SetStatus {
                    id: video.id,
                    status: VideoStatus::New,
                });
            }
        }
        work_done += 1;
        report(work_done, "Verifying downloaded videos");
    }

    // Merge the fresh listing
    let mut new_count = 0usize;
    for video in fresh {
        let status = if !rules.is_allowed(&video.title, video.duration.as_deref()) {
            VideoStatus::Ignored
        } else {
            let keys = ExistenceKeys {
                url: &video.url,
                viewkey: &video.viewkey,
                media_ids: &video.media_ids,
                title: &video.title,
            };
            match oracle.probe(&keys).await {
                Existence::Present => VideoStatus::Downloaded,
                Existence::Absent | Existence::Unknown => {
                    new_count += 1;
                    VideoStatus::New
                }
            }
        };
        mutations.push(Mutation::Insert {
            video: video.clone(),
            status,
        });
        work_done += 1;
        report(work_done, "Merging discovered videos");
    }

    let new_video_ids = commit(db.pool(), performer_id, mutations)
        .await
        .context("Failed to persist scan results")?;

    progress.progress(100, format!("Scan complete: {} new videos", new_count));
    info!(performer_id, new_count, total_found, "Scan finished");

    Ok(ScanOutcome {
        new_count,
        total_found,
        new_video_ids,
    })
}

/// Apply a scan's mutation batch and the last-scan stamp atomically.
/// Returns the row ids of videos inserted with status `new`.
async fn commit(
    pool: &SqlitePool,
    performer_id: &str,
    mutations: Vec<Mutation>,
) -> Result<Vec<i64>> {
    let mut tx = pool.begin().await?;
    let mut new_video_ids = Vec::new();

    for mutation in mutations {
        match mutation {
            Mutation::SetStatus { id, status } => {
                sqlx::query("UPDATE videos SET status = ?2 WHERE id = ?1")
                    .bind(id)
                    .bind(status.as_str())
                    .execute(&mut *tx)
                    .await?;
            }
            Mutation::Insert { video, status } => {
                let result = sqlx::query(
                    "INSERT INTO videos \
                     (performer_id, title, url, viewkey, published, duration, media_ids, status, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) \
                     ON CONFLICT(performer_id, viewkey) DO NOTHING",
                )
                .bind(performer_id)
                .bind(&video.title)
                .bind(&video.url)
                .bind(&video.viewkey)
                .bind(&video.published)
                .bind(&video.duration)
                .bind(list_to_json(&video.media_ids))
                .bind(status.as_str())
                .bind(now_iso8601())
                .execute(&mut *tx)
                .await?;
                if status == VideoStatus::New && result.rows_affected() > 0 {
                    new_video_ids.push(result.last_insert_rowid());
                }
            }
        }
    }

    sqlx::query("UPDATE performers SET last_scan = ?2 WHERE id = ?1")
        .bind(performer_id)
        .bind(now_iso8601())
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(new_video_ids)
}

/// Assemble the oracle from current settings: local index over the
/// performer's download directory, plus the library client when configured.
async fn build_oracle(db: &Database, performer: &PerformerRecord) -> Result<ExistenceOracle> {
    let settings = db.settings();

    let local = if settings.get_bool("local_check_existing", true).await? {
        let dir: Option<PathBuf> = settings
            .download_path_for(performer.site.as_str())
            .await?
            .map(|base| performer_dir(&base, &performer.name));
        local_index_for(dir.as_deref())
    } else {
        None
    };

    let library = if settings.get_bool("library_check_existing", true).await? {
        LibraryClient::from_settings(&settings).await?
    } else {
        None
    };

    Ok(ExistenceOracle::new(local, library))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    use crate::db::CreatePerformer;
    use crate::sources::{DiscoveryOutcome, NoopProgress, Site};

    /// Source returning a canned listing
    struct StaticSource {
        videos: Vec<DiscoveredVideo>,
        error: Option<String>,
    }

    impl StaticSource {
        fn with(videos: Vec<DiscoveredVideo>) -> Self {
            Self {
                videos,
                error: None,
            }
        }
    }

    #[async_trait]
    impl VideoSource for StaticSource {
        async fn discover(
            &self,
            _performer: &PerformerRecord,
            _progress: &dyn ProgressSink,
        ) -> DiscoveryOutcome {
            DiscoveryOutcome {
                videos: self.videos.clone(),
                error: self.error.clone(),
            }
        }
    }

    fn video(viewkey: &str, title: &str) -> DiscoveredVideo {
        DiscoveredVideo {
            title: title.to_string(),
            url: format!("https://example.com/watch/{}", viewkey),
            viewkey: viewkey.to_string(),
            published: Some("2024-05-01".to_string()),
            duration: Some("12:00".to_string()),
            media_ids: Vec::new(),
        }
    }

    async fn setup() -> (Database, String) {
        let db = Database::connect_in_memory().await.unwrap();
        let performer = db
            .performers()
            .create(CreatePerformer {
                id: "creator1".to_string(),
                name: "Creator One".to_string(),
                site: Site::Youtube,
                kind: "channel".to_string(),
            })
            .await
            .unwrap();
        // No download path configured: the local check has nothing to index
        (db, performer.id)
    }

    async fn insert_video(db: &Database, performer_id: &str, viewkey: &str, status: VideoStatus) {
        let v = video(viewkey, &format!("Video {}", viewkey));
        commit(
            db.pool(),
            performer_id,
            vec![Mutation::Insert { video: v, status }],
        )
        .await
        .unwrap();
    }

    async fn statuses(db: &Database, performer_id: &str) -> Vec<(String, VideoStatus)> {
        let mut all: Vec<(String, VideoStatus)> = db
            .videos()
            .list_for_performer(performer_id)
            .await
            .unwrap()
            .into_iter()
            .map(|v| (v.viewkey, v.status))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    #[tokio::test]
    async fn blacklisted_discovery_is_created_ignored() {
        let (db, pid) = setup().await;
        db.performers()
            .update(
                &pid,
                crate::db::UpdatePerformer {
                    blacklist_keywords: Some("ad".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let source = StaticSource::with(vec![video("v1", "Cool Ad Clip")]);
        let outcome = scan_performer(&db, &source, &pid, &NoopProgress)
            .await
            .unwrap();

        assert_eq!(outcome.new_count, 0);
        assert_eq!(outcome.total_found, 1);
        assert_eq!(
            statuses(&db, &pid).await,
            vec![("v1".to_string(), VideoStatus::Ignored)]
        );
    }

    #[tokio::test]
    async fn unfiltered_discovery_is_created_new() {
        let (db, pid) = setup().await;
        let source = StaticSource::with(vec![video("v2", "Plain Video")]);

        let outcome = scan_performer(&db, &source, &pid, &NoopProgress)
            .await
            .unwrap();

        assert_eq!(outcome.new_count, 1);
        assert_eq!(outcome.new_video_ids.len(), 1);
        assert_eq!(
            statuses(&db, &pid).await,
            vec![("v2".to_string(), VideoStatus::New)]
        );

        let performer = db.performers().get(&pid).await.unwrap().unwrap();
        assert!(performer.last_scan.is_some());
    }

    #[tokio::test]
    async fn locally_deleted_download_reverts_to_new() {
        let (db, pid) = setup().await;

        // Local check points at a real (empty) performer directory
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("Creator One")).unwrap();
        let settings = db.settings();
        settings
            .set("download_path", &tmp.path().to_string_lossy())
            .await
            .unwrap();

        insert_video(&db, &pid, "v3", VideoStatus::Downloaded).await;
        let source = StaticSource::with(vec![]);
        scan_performer(&db, &source, &pid, &NoopProgress)
            .await
            .unwrap();

        assert_eq!(
            statuses(&db, &pid).await,
            vec![("v3".to_string(), VideoStatus::New)]
        );
    }

    #[tokio::test]
    async fn disabled_checks_never_revert() {
        let (db, pid) = setup().await;
        let settings = db.settings();
        settings.set("local_check_existing", "false").await.unwrap();
        settings
            .set("library_check_existing", "false")
            .await
            .unwrap();

        insert_video(&db, &pid, "v3", VideoStatus::Downloaded).await;
        let source = StaticSource::with(vec![]);
        scan_performer(&db, &source, &pid, &NoopProgress)
            .await
            .unwrap();

        assert_eq!(
            statuses(&db, &pid).await,
            vec![("v3".to_string(), VideoStatus::Downloaded)]
        );
    }

    #[tokio::test]
    async fn rule_change_ignores_existing_new_record() {
        let (db, pid) = setup().await;
        insert_video(&db, &pid, "v4", VideoStatus::New).await;

        // "Video v4" record predates the blacklist entry below
        db.settings().set("blacklist", "v4").await.unwrap();
        let source = StaticSource::with(vec![]);
        scan_performer(&db, &source, &pid, &NoopProgress)
            .await
            .unwrap();

        assert_eq!(
            statuses(&db, &pid).await,
            vec![("v4".to_string(), VideoStatus::Ignored)]
        );
    }

    #[tokio::test]
    async fn existing_file_marks_discovery_downloaded() {
        let (db, pid) = setup().await;

        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("Creator One");
        std::fs::create_dir(&dir).unwrap();
        std::fs::write(dir.join("Plain Video [v5].mp4"), b"x").unwrap();
        db.settings()
            .set("download_path", &tmp.path().to_string_lossy())
            .await
            .unwrap();

        let source = StaticSource::with(vec![video("v5", "Plain Video")]);
        let outcome = scan_performer(&db, &source, &pid, &NoopProgress)
            .await
            .unwrap();

        assert_eq!(outcome.new_count, 0);
        assert_eq!(
            statuses(&db, &pid).await,
            vec![("v5".to_string(), VideoStatus::Downloaded)]
        );
    }

    #[tokio::test]
    async fn rescan_is_idempotent() {
        let (db, pid) = setup().await;
        let source = StaticSource::with(vec![video("v6", "Stable"), video("v7", "Also Stable")]);

        let first = scan_performer(&db, &source, &pid, &NoopProgress)
            .await
            .unwrap();
        assert_eq!(first.new_count, 2);

        let second = scan_performer(&db, &source, &pid, &NoopProgress)
            .await
            .unwrap();
        assert_eq!(second.new_count, 0);
        assert_eq!(second.total_found, 2);
        assert_eq!(
            statuses(&db, &pid).await,
            vec![
                ("v6".to_string(), VideoStatus::New),
                ("v7".to_string(), VideoStatus::New),
            ]
        );
    }

    #[tokio::test]
    async fn duplicate_viewkeys_in_one_pass_create_one_row() {
        let (db, pid) = setup().await;
        let source =
            StaticSource::with(vec![video("v8", "First Sight"), video("v8", "Second Sight")]);

        let outcome = scan_performer(&db, &source, &pid, &NoopProgress)
            .await
            .unwrap();

        assert_eq!(outcome.new_count, 1);
        assert_eq!(statuses(&db, &pid).await.len(), 1);
    }

    #[tokio::test]
    async fn partial_discovery_still_reconciles() {
        let (db, pid) = setup().await;
        let source = StaticSource {
            videos: vec![video("v9", "Got This Far")],
            error: Some("page 2 timed out".to_string()),
        };

        let outcome = scan_performer(&db, &source, &pid, &NoopProgress)
            .await
            .unwrap();
        assert_eq!(outcome.new_count, 1);
    }

    #[tokio::test]
    async fn empty_failed_discovery_fails_the_scan() {
        let (db, pid) = setup().await;
        let source = StaticSource {
            videos: vec![],
            error: Some("login wall".to_string()),
        };

        let result = scan_performer(&db, &source, &pid, &NoopProgress).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn ignored_records_are_untouched() {
        let (db, pid) = setup().await;
        insert_video(&db, &pid, "v10", VideoStatus::Ignored).await;

        let source = StaticSource::with(vec![]);
        scan_performer(&db, &source, &pid, &NoopProgress)
            .await
            .unwrap();

        assert_eq!(
            statuses(&db, &pid).await,
            vec![("v10".to_string(), VideoStatus::Ignored)]
        );
    }
}

//! Video management REST endpoints
//!
//! Downloads run as background tasks; ignore/unignore are the only direct
//! status flips a user can make.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

use crate::AppState;
use crate::db::{Database, VideoRecord, VideoStatus};
use crate::services::library::LibraryClient;
use crate::services::notifications;
use crate::services::{TaskSnapshot, TaskStatus};

#[derive(Debug, Serialize)]
pub struct VideoResponse {
    pub id: i64,
    pub performer_id: String,
    pub title: String,
    pub url: String,
    pub viewkey: String,
    pub published: Option<String>,
    pub duration: Option<String>,
    pub media_ids: Vec<String>,
    pub status: VideoStatus,
}

impl From<VideoRecord> for VideoResponse {
    fn from(record: VideoRecord) -> Self {
        Self {
            id: record.id,
            performer_id: record.performer_id,
            title: record.title,
            url: record.url,
            viewkey: record.viewkey,
            published: record.published,
            duration: record.duration,
            media_ids: record.media_ids,
            status: record.status,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub video_ids: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct BatchStartedResponse {
    pub task_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct TaskStartedResponse {
    pub task_id: Uuid,
}

async fn get_video(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<VideoResponse>, StatusCode> {
    match state.db.videos().get(id).await {
        Ok(Some(record)) => Ok(Json(record.into())),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            error!(error = %e, "Failed to fetch video");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

async fn download_video(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<(StatusCode, Json<TaskStartedResponse>), StatusCode> {
    match state.db.videos().get(id).await {
        Ok(Some(_)) => {}
        Ok(None) => return Err(StatusCode::NOT_FOUND),
        Err(e) => {
            error!(error = %e, "Failed to fetch video");
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    }
    let task_id = state.spawn_download(id);
    Ok((StatusCode::ACCEPTED, Json(TaskStartedResponse { task_id })))
}

/// Succeeded/failed split of a settled batch
fn batch_outcome(snapshots: &[TaskSnapshot]) -> (usize, usize) {
    let succeeded = snapshots
        .iter()
        .filter(|t| t.status == TaskStatus::Completed)
        .count();
    (succeeded, snapshots.len() - succeeded)
}

/// Queue downloads for a batch of videos. Once every member task has
/// finished, a summary goes out via Telegram and a single library auto-tag
/// pass is triggered; per-download syncs only push scene metadata, so the
/// auto-tag pass runs once per batch rather than once per video.
async fn download_batch(
    State(state): State<AppState>,
    Json(body): Json<BatchRequest>,
) -> Result<(StatusCode, Json<BatchStartedResponse>), StatusCode> {
    if body.video_ids.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    let task_ids: Vec<Uuid> = body
        .video_ids
        .iter()
        .map(|&id| state.spawn_download(id))
        .collect();

    let monitor_state = state.clone();
    state
        .tasks
        .monitor_batch(task_ids.clone(), move |snapshots| async move {
            let (succeeded, failed) = batch_outcome(&snapshots);
            let text = format!(
                "<b>Batch download finished</b>\n{} succeeded, {} failed",
                succeeded, failed
            );
            notifications::notify(&monitor_state.db.settings(), &text).await;

            if succeeded > 0 {
                match LibraryClient::from_settings(&monitor_state.db.settings()).await {
                    Ok(Some(library)) => {
                        if !library.auto_tag(None).await {
                            error!("Library auto-tag after batch download failed");
                        }
                    }
                    Ok(None) => {}
                    Err(e) => error!(error = %e, "Failed to build library client for auto-tag"),
                }
            }
        });

    Ok((StatusCode::ACCEPTED, Json(BatchStartedResponse { task_ids })))
}

/// Flip one video's status subject to the allowed user transitions
async fn set_video_status(db: &Database, id: i64, status: VideoStatus) -> StatusCode {
    let current = match db.videos().get(id).await {
        Ok(Some(record)) => record,
        Ok(None) => return StatusCode::NOT_FOUND,
        Err(e) => {
            error!(error = %e, "Failed to fetch video");
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
    };
    // Unignore only brings a video back from `ignored`
    if status == VideoStatus::New && current.status != VideoStatus::Ignored {
        return StatusCode::CONFLICT;
    }
    match db.videos().set_status(id, status).await {
        Ok(true) => StatusCode::NO_CONTENT,
        Ok(false) => StatusCode::NOT_FOUND,
        Err(e) => {
            error!(error = %e, "Failed to update video status");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

async fn ignore_video(State(state): State<AppState>, Path(id): Path<i64>) -> StatusCode {
    set_video_status(&state.db, id, VideoStatus::Ignored).await
}

async fn unignore_video(State(state): State<AppState>, Path(id): Path<i64>) -> StatusCode {
    set_video_status(&state.db, id, VideoStatus::New).await
}

/// Apply a status flip to every id in a batch. Per-video conflicts and
/// missing ids are skipped so one bad member does not abort the rest;
/// only a storage failure stops the sweep.
async fn set_status_batch(db: &Database, video_ids: Vec<i64>, status: VideoStatus) -> StatusCode {
    for id in video_ids {
        let code = set_video_status(db, id, status).await;
        if code == StatusCode::INTERNAL_SERVER_ERROR {
            return code;
        }
    }
    StatusCode::NO_CONTENT
}

async fn ignore_batch(
    State(state): State<AppState>,
    Json(body): Json<BatchRequest>,
) -> StatusCode {
    set_status_batch(&state.db, body.video_ids, VideoStatus::Ignored).await
}

async fn unignore_batch(
    State(state): State<AppState>,
    Json(body): Json<BatchRequest>,
) -> StatusCode {
    set_status_batch(&state.db, body.video_ids, VideoStatus::New).await
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/videos/{id}", get(get_video))
        .route("/videos/{id}/download", post(download_video))
        .route("/videos/{id}/ignore", post(ignore_video))
        .route("/videos/{id}/unignore", post(unignore_video))
        .route("/videos/download-batch", post(download_batch))
        .route("/videos/ignore-batch", post(ignore_batch))
        .route("/videos/unignore-batch", post(unignore_batch))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::CreatePerformer;
    use crate::sources::Site;

    async fn seeded_db(statuses: &[VideoStatus]) -> (Database, Vec<i64>) {
        let db = Database::connect_in_memory().await.unwrap();
        db.performers()
            .create(CreatePerformer {
                id: "creator1".to_string(),
                name: "Creator One".to_string(),
                site: Site::Youtube,
                kind: "channel".to_string(),
            })
            .await
            .unwrap();

        let mut ids = Vec::new();
        for (i, status) in statuses.iter().enumerate() {
            let result = sqlx::query(
                "INSERT INTO videos (performer_id, title, url, viewkey, status, created_at)
                 VALUES ('creator1', ?1, ?2, ?3, ?4, ?5)",
            )
            .bind(format!("Video {i}"))
            .bind(format!("https://example.com/v{i}"))
            .bind(format!("vk{i}"))
            .bind(status.as_str())
            .bind(crate::db::sqlite_helpers::now_iso8601())
            .execute(db.pool())
            .await
            .unwrap();
            ids.push(result.last_insert_rowid());
        }
        (db, ids)
    }

    async fn status_of(db: &Database, id: i64) -> VideoStatus {
        db.videos().get(id).await.unwrap().unwrap().status
    }

    #[tokio::test]
    async fn unignore_only_from_ignored() {
        let (db, ids) = seeded_db(&[VideoStatus::Ignored, VideoStatus::Downloaded]).await;

        assert_eq!(
            set_video_status(&db, ids[0], VideoStatus::New).await,
            StatusCode::NO_CONTENT
        );
        assert_eq!(status_of(&db, ids[0]).await, VideoStatus::New);

        assert_eq!(
            set_video_status(&db, ids[1], VideoStatus::New).await,
            StatusCode::CONFLICT
        );
        assert_eq!(status_of(&db, ids[1]).await, VideoStatus::Downloaded);
    }

    #[tokio::test]
    async fn batch_unignore_restores_ignored_and_skips_the_rest() {
        let (db, ids) =
            seeded_db(&[VideoStatus::Ignored, VideoStatus::Downloaded, VideoStatus::Ignored])
                .await;

        let code = set_status_batch(&db, ids.clone(), VideoStatus::New).await;
        assert_eq!(code, StatusCode::NO_CONTENT);

        assert_eq!(status_of(&db, ids[0]).await, VideoStatus::New);
        assert_eq!(status_of(&db, ids[1]).await, VideoStatus::Downloaded);
        assert_eq!(status_of(&db, ids[2]).await, VideoStatus::New);
    }

    fn snapshot(status: TaskStatus) -> TaskSnapshot {
        TaskSnapshot {
            id: Uuid::new_v4(),
            kind: "download".to_string(),
            status,
            progress: 100,
            message: String::new(),
            bytes_done: 0,
            bytes_total: None,
            result: None,
            error: None,
            created_at: chrono::Utc::now(),
            finished_at: Some(chrono::Utc::now()),
        }
    }

    #[test]
    fn batch_outcome_splits_by_completion() {
        let snapshots = vec![
            snapshot(TaskStatus::Completed),
            snapshot(TaskStatus::Failed),
            snapshot(TaskStatus::Completed),
        ];
        assert_eq!(batch_outcome(&snapshots), (2, 1));
        assert_eq!(batch_outcome(&[]), (0, 0));
    }

    #[tokio::test]
    async fn batch_ignore_tolerates_missing_ids() {
        let (db, ids) = seeded_db(&[VideoStatus::New]).await;

        let code = set_status_batch(&db, vec![ids[0], 9999], VideoStatus::Ignored).await;
        assert_eq!(code, StatusCode::NO_CONTENT);
        assert_eq!(status_of(&db, ids[0]).await, VideoStatus::Ignored);
    }
}

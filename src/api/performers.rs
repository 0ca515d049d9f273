//! Performer management REST endpoints

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
use crate::db::{CreatePerformer, PerformerRecord, UpdatePerformer};
use crate::sources::Site;

#[derive(Debug, Serialize)]
pub struct PerformerResponse {
    pub id: String,
    pub name: String,
    pub site: String,
    pub kind: String,
    pub profile_url: String,
    pub blacklist_keywords: Option<String>,
    pub whitelist_keywords: Option<String>,
    pub min_duration: i32,
    pub scheduled_scan_enabled: bool,
    pub auto_download: bool,
    pub use_auth_session: bool,
    pub last_scan: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<PerformerRecord> for PerformerResponse {
    fn from(record: PerformerRecord) -> Self {
        Self {
            profile_url: record.site.profile_url(&record.id, &record.kind),
            id: record.id,
            name: record.name,
            site: record.site.as_str().to_string(),
            kind: record.kind,
            blacklist_keywords: record.blacklist_keywords,
            whitelist_keywords: record.whitelist_keywords,
            min_duration: record.min_duration,
            scheduled_scan_enabled: record.scheduled_scan_enabled,
            auto_download: record.auto_download,
            use_auth_session: record.use_auth_session,
            last_scan: record.last_scan,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreatePerformerRequest {
    pub id: String,
    pub name: String,
    pub site: String,
    #[serde(default)]
    pub kind: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdatePerformerRequest {
    pub name: Option<String>,
    pub blacklist_keywords: Option<String>,
    pub whitelist_keywords: Option<String>,
    pub min_duration: Option<i32>,
    pub scheduled_scan_enabled: Option<bool>,
    pub auto_download: Option<bool>,
    pub use_auth_session: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct TaskStartedResponse {
    pub task_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct ScanAllResponse {
    pub task_ids: Vec<Uuid>,
}

async fn list_performers(
    State(state): State<AppState>,
) -> Result<Json<Vec<PerformerResponse>>, StatusCode> {
    match state.db.performers().list_all().await {
        Ok(records) => Ok(Json(records.into_iter().map(Into::into).collect())),
        Err(e) => {
            error!(error = %e, "Failed to list performers");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

async fn get_performer(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PerformerResponse>, StatusCode> {
    match state.db.performers().get(&id).await {
        Ok(Some(record)) => Ok(Json(record.into())),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            error!(error = %e, "Failed to fetch performer");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

async fn create_performer(
    State(state): State<AppState>,
    Json(body): Json<CreatePerformerRequest>,
) -> Result<(StatusCode, Json<PerformerResponse>), StatusCode> {
    let site: Site = body.site.parse().map_err(|_| StatusCode::BAD_REQUEST)?;
    let input = CreatePerformer {
        id: body.id,
        name: body.name,
        site,
        kind: body.kind,
    };
    match state.db.performers().create(input).await {
        Ok(record) => Ok((StatusCode::CREATED, Json(record.into()))),
        Err(e) => {
            error!(error = %e, "Failed to create performer");
            Err(StatusCode::CONFLICT)
        }
    }
}

async fn update_performer(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdatePerformerRequest>,
) -> Result<Json<PerformerResponse>, StatusCode> {
    let input = UpdatePerformer {
        name: body.name,
        blacklist_keywords: body.blacklist_keywords,
        whitelist_keywords: body.whitelist_keywords,
        min_duration: body.min_duration,
        scheduled_scan_enabled: body.scheduled_scan_enabled,
        auto_download: body.auto_download,
        use_auth_session: body.use_auth_session,
    };
    match state.db.performers().update(&id, input).await {
        Ok(Some(record)) => Ok(Json(record.into())),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            error!(error = %e, "Failed to update performer");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

async fn delete_performer(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> StatusCode {
    match state.db.performers().delete(&id).await {
        Ok(true) => StatusCode::NO_CONTENT,
        Ok(false) => StatusCode::NOT_FOUND,
        Err(e) => {
            error!(error = %e, "Failed to delete performer");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Start a background scan for one performer, returns immediately
async fn scan_performer(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<TaskStartedResponse>), StatusCode> {
    match state.db.performers().get(&id).await {
        Ok(Some(_)) => {}
        Ok(None) => return Err(StatusCode::NOT_FOUND),
        Err(e) => {
            error!(error = %e, "Failed to fetch performer");
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    }
    let task_id = state.spawn_scan(id);
    Ok((StatusCode::ACCEPTED, Json(TaskStartedResponse { task_id })))
}

/// Start background scans for every performer
async fn scan_all(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<ScanAllResponse>), StatusCode> {
    let performers = match state.db.performers().list_all().await {
        Ok(records) => records,
        Err(e) => {
            error!(error = %e, "Failed to list performers");
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };
    let task_ids = performers
        .into_iter()
        .map(|p| state.spawn_scan(p.id))
        .collect();
    Ok((StatusCode::ACCEPTED, Json(ScanAllResponse { task_ids })))
}

async fn list_videos(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<super::videos::VideoResponse>>, StatusCode> {
    match state.db.videos().list_for_performer(&id).await {
        Ok(records) => Ok(Json(records.into_iter().map(Into::into).collect())),
        Err(e) => {
            error!(error = %e, "Failed to list videos");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/performers", get(list_performers).post(create_performer))
        .route(
            "/performers/{id}",
            get(get_performer)
                .put(update_performer)
                .delete(delete_performer),
        )
        .route("/performers/{id}/scan", post(scan_performer))
        .route("/performers/scan-all", post(scan_all))
        .route("/performers/{id}/videos", get(list_videos))
}

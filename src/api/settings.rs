//! Settings REST endpoints
//!
//! Settings are a flat key→value map read through on every scan, so edits
//! take effect without a restart. The test endpoints exercise the external
//! integrations with the currently stored values.

use std::collections::BTreeMap;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use serde::Serialize;
use tracing::error;

use crate::AppState;
use crate::services::library::LibraryClient;
use crate::services::notifications;

#[derive(Debug, Serialize)]
pub struct TestResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

async fn get_settings(
    State(state): State<AppState>,
) -> Result<Json<BTreeMap<String, String>>, StatusCode> {
    match state.db.settings().list_all().await {
        Ok(records) => Ok(Json(
            records
                .into_iter()
                .map(|r| (r.key, r.value.unwrap_or_default()))
                .collect(),
        )),
        Err(e) => {
            error!(error = %e, "Failed to list settings");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

async fn put_settings(
    State(state): State<AppState>,
    Json(body): Json<BTreeMap<String, String>>,
) -> StatusCode {
    let settings = state.db.settings();
    for (key, value) in &body {
        if let Err(e) = settings.set(key, value).await {
            error!(key, error = %e, "Failed to store setting");
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
    }
    StatusCode::NO_CONTENT
}

/// Verify the configured external library is reachable
async fn test_library(State(state): State<AppState>) -> Json<TestResponse> {
    let settings = state.db.settings();
    let client = match LibraryClient::from_settings(&settings).await {
        Ok(Some(client)) => client,
        Ok(None) => {
            return Json(TestResponse {
                success: false,
                detail: None,
                error: Some("No library URL configured".to_string()),
            });
        }
        Err(e) => {
            return Json(TestResponse {
                success: false,
                detail: None,
                error: Some(e.to_string()),
            });
        }
    };
    match client.test_connection().await {
        Ok(version) => Json(TestResponse {
            success: true,
            detail: Some(format!("Library version {}", version)),
            error: None,
        }),
        Err(e) => Json(TestResponse {
            success: false,
            detail: None,
            error: Some(e.to_string()),
        }),
    }
}

/// Send a test message through the configured Telegram bot
async fn test_telegram(State(state): State<AppState>) -> Json<TestResponse> {
    match notifications::send_message(&state.db.settings(), "Test notification").await {
        Ok(true) => Json(TestResponse {
            success: true,
            detail: Some("Message sent".to_string()),
            error: None,
        }),
        Ok(false) => Json(TestResponse {
            success: false,
            detail: None,
            error: Some("Telegram is not configured or rejected the message".to_string()),
        }),
        Err(e) => Json(TestResponse {
            success: false,
            detail: None,
            error: Some(e.to_string()),
        }),
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/settings", get(get_settings).put(put_settings))
        .route("/settings/test-library", post(test_library))
        .route("/settings/test-telegram", post(test_telegram))
}

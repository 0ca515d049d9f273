//! Liveness and readiness endpoints
//!
//! `/healthz` answers whenever the process is up. `/readyz` additionally
//! checks the SQLite pool and reports task-runner load, so an operator can
//! tell a busy instance from a broken one.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Json, Router, routing::get};
use serde::Serialize;

use crate::AppState;
use crate::services::TaskStore;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub ready: bool,
    pub database: bool,
    /// Scans and downloads currently pending or running
    pub active_tasks: usize,
}

async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
    })
}

fn active_task_count(tasks: &TaskStore) -> usize {
    tasks
        .list()
        .iter()
        .filter(|t| !t.status.is_terminal())
        .count()
}

/// Not ready while the database is unreachable; task load is informational
async fn readyz(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let database = sqlx::query("SELECT 1")
        .fetch_one(state.db.pool())
        .await
        .is_ok();
    let code = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        code,
        Json(ReadyResponse {
            ready: database,
            database,
            active_tasks: active_task_count(&state.tasks),
        }),
    )
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn active_tasks_counts_only_unfinished_work() {
        let store = TaskStore::new();
        assert_eq!(active_task_count(&store), 0);

        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        store.spawn("scan", move |_handle| async move {
            let _ = release_rx.await;
            Ok(serde_json::Value::Null)
        });
        // Give the runtime a beat to move the task into `running`.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(active_task_count(&store), 1);

        release_tx.send(()).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(active_task_count(&store), 0);
    }
}

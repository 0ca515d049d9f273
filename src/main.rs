//! Followarr - creator tracking and download reconciliation service
//!
//! Tracks performers across video platforms, periodically discovers their
//! new videos, filters them against keyword rules, downloads the keepers
//! and reconciles state against the local filesystem and an external
//! media library. All operations are exposed over a small REST API.

mod api;
mod config;
mod db;
mod jobs;
mod services;
mod sources;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use crate::config::Config;
use crate::db::Database;
use crate::services::downloader::{self, MediaFetcher, YtDlpFetcher};
use crate::services::{TaskStore, scan_performer};
use crate::sources::SourceDispatch;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Database,
    pub tasks: TaskStore,
    pub source: Arc<SourceDispatch>,
    pub fetcher: Arc<dyn MediaFetcher>,
}

impl AppState {
    /// Queue a scan task for one performer
    pub fn spawn_scan(&self, performer_id: String) -> Uuid {
        let state = self.clone();
        self.tasks.spawn("scan", move |handle| async move {
            let outcome =
                scan_performer(&state.db, state.source.as_ref(), &performer_id, &handle).await?;
            Ok(serde_json::to_value(outcome)?)
        })
    }

    /// Queue a download task for one video
    pub fn spawn_download(&self, video_id: i64) -> Uuid {
        let state = self.clone();
        self.tasks.spawn("download", move |handle| async move {
            downloader::download_video(
                &state.db,
                state.fetcher.as_ref(),
                video_id,
                &state.config.cookies_path,
                &handle,
            )
            .await
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(Config::from_env()?);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "followarr=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    tracing::info!("Starting Followarr");

    let db = Database::connect(&config.database_path).await?;
    tracing::info!("Database connected");

    let state = AppState {
        config: config.clone(),
        db,
        tasks: TaskStore::new(),
        source: Arc::new(SourceDispatch::new(config.cookies_path.clone())),
        fetcher: Arc::new(YtDlpFetcher::default()),
    };

    let _scheduler = jobs::start_scheduler(state.clone()).await?;

    let app = Router::new()
        .merge(api::health::router())
        .nest("/api", api::performers::router())
        .nest("/api", api::videos::router())
        .nest("/api", api::tasks::router())
        .nest("/api", api::settings::router())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

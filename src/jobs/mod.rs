//! Background job scheduling

pub mod scheduled_scan;

use std::time::Duration;

use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::info;

use crate::AppState;

const DEFAULT_SCAN_INTERVAL_MINUTES: u64 = 60;

/// Initialize and start the job scheduler.
///
/// The scan interval is read from settings once at startup; changing it
/// takes effect on the next restart.
pub async fn start_scheduler(state: AppState) -> anyhow::Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let interval_minutes = state
        .db
        .settings()
        .get("scan_interval_minutes")
        .await?
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|&m| m > 0)
        .unwrap_or(DEFAULT_SCAN_INTERVAL_MINUTES);

    let scan_state = state.clone();
    let scan_job = Job::new_repeated_async(
        Duration::from_secs(interval_minutes * 60),
        move |_uuid, _l| {
            let state = scan_state.clone();
            Box::pin(async move {
                info!("Running scheduled scan");
                if let Err(e) = scheduled_scan::run(state).await {
                    tracing::error!("Scheduled scan error: {}", e);
                }
            })
        },
    )?;
    scheduler.add(scan_job).await?;

    scheduler.start().await?;
    info!(interval_minutes, "Job scheduler started");
    Ok(scheduler)
}

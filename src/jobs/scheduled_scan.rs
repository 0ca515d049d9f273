//! Periodic scan over all schedule-enabled performers
//!
//! Each performer gets its own scan task so the usual concurrency bound
//! applies. Once the whole batch has settled, performers with auto-download
//! cascade their new videos into download tasks, and a Telegram summary
//! goes out if anything new turned up.

use std::collections::HashMap;

use anyhow::Result;
use tracing::{info, warn};
use uuid::Uuid;

use crate::AppState;
use crate::services::{ScanOutcome, TaskStatus};
use crate::services::notifications;

pub async fn run(state: AppState) -> Result<()> {
    let performers = state.db.performers().list_scheduled().await?;
    if performers.is_empty() {
        return Ok(());
    }
    info!(count = performers.len(), "Scheduled scan starting");

    let mut task_ids = Vec::new();
    let mut by_task: HashMap<Uuid, (String, bool)> = HashMap::new();
    for performer in performers {
        let task_id = state.spawn_scan(performer.id.clone());
        by_task.insert(task_id, (performer.name, performer.auto_download));
        task_ids.push(task_id);
    }

    let monitor_state = state.clone();
    state.tasks.monitor_batch(task_ids, move |snapshots| async move {
        let mut total_new = 0usize;
        let mut lines = Vec::new();

        for task in snapshots {
            let Some((name, auto_download)) = by_task.get(&task.id) else {
                continue;
            };
            if task.status != TaskStatus::Completed {
                warn!(performer = %name, error = ?task.error, "Scheduled scan task failed");
                continue;
            }
            let Some(outcome) = task
                .result
                .and_then(|v| serde_json::from_value::<ScanOutcome>(v).ok())
            else {
                continue;
            };
            if outcome.new_count == 0 {
                continue;
            }

            total_new += outcome.new_count;
            lines.push(format!("{}: {} new", name, outcome.new_count));
            if *auto_download {
                for video_id in outcome.new_video_ids {
                    monitor_state.spawn_download(video_id);
                }
            }
        }

        if total_new > 0 {
            let text = format!(
                "<b>Scheduled scan found {} new videos</b>\n{}",
                total_new,
                lines.join("\n")
            );
            notifications::notify(&monitor_state.db.settings(), &text).await;
        }
        info!(total_new, "Scheduled scan finished");
    });

    Ok(())
}

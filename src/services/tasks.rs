//! In-memory background task registry
//!
//! Tasks are spawned onto the tokio runtime behind a shared semaphore that
//! caps how many scans/downloads run at once; everything past the cap sits
//! in `Pending` until a permit frees up. Task records live for the life of
//! the process and are never evicted, so a client can always poll a task id
//! it was handed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{error, info};
use uuid::Uuid;

use crate::sources::ProgressSink;

/// Upper bound on concurrently running tasks
pub const MAX_CONCURRENT_TASKS: usize = 3;

const MONITOR_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// Point-in-time view of a task, safe to hand to the API layer
#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    pub id: Uuid,
    pub kind: String,
    pub status: TaskStatus,
    /// 0..=100
    pub progress: u8,
    pub message: String,
    /// Transfer counters, populated by download tasks
    pub bytes_done: u64,
    pub bytes_total: Option<u64>,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct TaskRecord {
    kind: String,
    status: TaskStatus,
    progress: u8,
    message: String,
    bytes_done: u64,
    bytes_total: Option<u64>,
    result: Option<Value>,
    error: Option<String>,
    created_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct TaskStore {
    tasks: Arc<RwLock<HashMap<Uuid, TaskRecord>>>,
    permits: Arc<Semaphore>,
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskStore {
    pub fn new() -> Self {
        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
            permits: Arc::new(Semaphore::new(MAX_CONCURRENT_TASKS)),
        }
    }

    /// Register a task and run it on the runtime once a permit is free.
    /// Returns immediately with the task id.
    pub fn spawn<F, Fut>(&self, kind: &str, work: F) -> Uuid
    where
        F: FnOnce(TaskHandle) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let id = Uuid::new_v4();
        self.tasks.write().insert(
            id,
            TaskRecord {
                kind: kind.to_string(),
                status: TaskStatus::Pending,
                progress: 0,
                message: String::new(),
                bytes_done: 0,
                bytes_total: None,
                result: None,
                error: None,
                created_at: Utc::now(),
                finished_at: None,
            },
        );

        let handle = TaskHandle {
            id,
            tasks: Arc::clone(&self.tasks),
        };
        let permits = Arc::clone(&self.permits);
        let tasks = Arc::clone(&self.tasks);
        let kind = kind.to_string();

        tokio::spawn(async move {
            // Closed only at shutdown; a closed semaphore just abandons the task
            let Ok(_permit) = permits.acquire().await else {
                return;
            };
            {
                let mut guard = tasks.write();
                if let Some(record) = guard.get_mut(&id) {
                    record.status = TaskStatus::Running;
                }
            }
            info!(task_id = %id, kind, "Task started");

            let outcome = work(handle).await;

            let mut guard = tasks.write();
            if let Some(record) = guard.get_mut(&id) {
                record.finished_at = Some(Utc::now());
                record.progress = 100;
                match outcome {
                    Ok(result) => {
                        record.status = TaskStatus::Completed;
                        record.result = Some(result);
                        info!(task_id = %id, kind, "Task completed");
                    }
                    Err(e) => {
                        record.status = TaskStatus::Failed;
                        record.error = Some(format!("{e:#}"));
                        error!(task_id = %id, kind, error = %e, "Task failed");
                    }
                }
            }
        });

        id
    }

    pub fn get(&self, id: Uuid) -> Option<TaskSnapshot> {
        let guard = self.tasks.read();
        let record = guard.get(&id)?;
        Some(TaskSnapshot {
            id,
            kind: record.kind.clone(),
            status: record.status,
            progress: record.progress,
            message: record.message.clone(),
            bytes_done: record.bytes_done,
            bytes_total: record.bytes_total,
            result: record.result.clone(),
            error: record.error.clone(),
            created_at: record.created_at,
            finished_at: record.finished_at,
        })
    }

    pub fn list(&self) -> Vec<TaskSnapshot> {
        let guard = self.tasks.read();
        let mut snapshots: Vec<TaskSnapshot> = guard
            .iter()
            .map(|(id, record)| TaskSnapshot {
                id: *id,
                kind: record.kind.clone(),
                status: record.status,
                progress: record.progress,
                message: record.message.clone(),
                bytes_done: record.bytes_done,
                bytes_total: record.bytes_total,
                result: record.result.clone(),
                error: record.error.clone(),
                created_at: record.created_at,
                finished_at: record.finished_at,
            })
            .collect();
        snapshots.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        snapshots
    }

    /// Poll a batch of tasks and invoke the callback exactly once when every
    /// member has reached a terminal state.
    pub fn monitor_batch<F, Fut>(&self, ids: Vec<Uuid>, on_done: F)
    where
        F: FnOnce(Vec<TaskSnapshot>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let store = self.clone();
        tokio::spawn(async move {
            loop {
                let all_done = {
                    let guard = store.tasks.read();
                    ids.iter().all(|id| {
                        guard
                            .get(id)
                            .is_none_or(|record| record.status.is_terminal())
                    })
                };
                if all_done {
                    break;
                }
                tokio::time::sleep(MONITOR_POLL_INTERVAL).await;
            }
            let snapshots = ids.iter().filter_map(|id| store.get(*id)).collect();
            on_done(snapshots).await;
        });
    }
}

/// Write half handed to a running task for progress reporting
#[derive(Clone)]
pub struct TaskHandle {
    id: Uuid,
    tasks: Arc<RwLock<HashMap<Uuid, TaskRecord>>>,
}

impl TaskHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Progress only moves forward; stale updates from overlapping phases
    /// are clamped rather than rewound.
    pub fn set_progress(&self, progress: u8, message: impl Into<String>) {
        let mut guard = self.tasks.write();
        if let Some(record) = guard.get_mut(&self.id) {
            record.progress = record.progress.max(progress.min(100));
            record.message = message.into();
        }
    }

    pub fn set_message(&self, message: impl Into<String>) {
        let mut guard = self.tasks.write();
        if let Some(record) = guard.get_mut(&self.id) {
            record.message = message.into();
        }
    }

    /// Download transfer counters
    pub fn set_bytes(&self, done: u64, total: Option<u64>) {
        let mut guard = self.tasks.write();
        if let Some(record) = guard.get_mut(&self.id) {
            record.bytes_done = done;
            if total.is_some() {
                record.bytes_total = total;
            }
        }
    }
}

impl ProgressSink for TaskHandle {
    fn message(&self, text: String) {
        self.set_message(text);
    }

    fn progress(&self, pct: u8, text: String) {
        self.set_progress(pct, text);
    }

    fn bytes(&self, done: u64, total: Option<u64>) {
        self.set_bytes(done, total);
    }
}

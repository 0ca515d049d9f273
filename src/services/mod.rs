//! Core services: filtering, existence checks, reconciliation, tasks,
//! downloads, and outbound integrations.

pub mod downloader;
pub mod existence;
pub mod filters;
pub mod library;
pub mod notifications;
pub mod reconcile;
pub mod tasks;

pub use reconcile::{ScanOutcome, scan_performer};
pub use tasks::{TaskHandle, TaskSnapshot, TaskStatus, TaskStore};

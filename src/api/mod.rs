//! REST API route definitions
//!
//! Long-running operations (scans, downloads) never block a request; those
//! endpoints return a task id immediately and the caller polls /api/tasks.

pub mod health;
pub mod performers;
pub mod settings;
pub mod tasks;
pub mod videos;

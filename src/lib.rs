//! memtask: task-execution core.
//!
//! A priority job queue with a worker pool and retries, a load-aware
//! recurring-task scheduler that feeds it, and an event-driven DAG engine.

pub mod cognition;
pub mod config;
pub mod error;
pub mod jobs;
pub mod scheduler;

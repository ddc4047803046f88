//! Recurring-task scheduler.
//!
//! - `task`: `RecurringTask` and its `Schedule` (fixed interval or cron)
//! - `health`: health reports, the `HealthMonitor` seam, and the queue-backed `LoadMonitor`
//! - `runner`: `BackgroundScheduler`, the tick loop that feeds the job processor

pub mod health;
pub mod runner;
pub mod task;

pub use health::{ComponentHealth, HealthMonitor, HealthReport, HealthStatus, LoadMonitor};
pub use runner::BackgroundScheduler;
pub use task::{RecurringTask, Schedule};

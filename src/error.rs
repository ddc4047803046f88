//! Error types for memtask.

use std::time::Duration;

use uuid::Uuid;

/// Top-level error type for the task core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Event error: {0}")]
    Event(#[from] EventError),

    #[error("Audit error: {0}")]
    Audit(#[from] AuditError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Queue/record store errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// The backing store cannot be reached. Triggers the in-memory fallback.
    #[error("Queue store unavailable: {0}")]
    Unavailable(String),

    #[error("Corrupt record {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

impl StoreError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Job-related errors.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Unknown job type: {job_type}")]
    UnknownJobType { job_type: String },

    #[error("Job {id} not found")]
    NotFound { id: Uuid },

    #[error("Job {id} handler failed: {reason}")]
    HandlerFailed { id: Uuid, reason: String },

    #[error("Job {id} failed after {attempts} attempts: {reason}")]
    RetryExhausted {
        id: Uuid,
        attempts: u32,
        reason: String,
    },

    #[error("Job {id} timed out after {timeout:?}")]
    TimedOut { id: Uuid, timeout: Duration },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Background scheduler errors.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Invalid schedule for task {name}: {reason}")]
    InvalidSchedule { name: String, reason: String },

    #[error("Malformed schedule '{expression}': {reason}")]
    MalformedSchedule { expression: String, reason: String },
}

/// DAG engine errors.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("Event {id} not found")]
    NotFound { id: String },

    #[error("Event {event} failed: {reason}")]
    HandlerFailed { event: String, reason: String },

    #[error("Event {event} panicked")]
    Panicked { event: String },

    #[error("Invocation cancelled")]
    Cancelled,

    #[error("Dispatch limit of {limit} events exceeded")]
    DispatchLimitExceeded { limit: usize },

    #[error("Invalid event group: {reason}")]
    InvalidGroup { reason: String },
}

/// Audit sink errors. Never surfaced past the audit broker.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("Audit sink failed: {0}")]
    Sink(String),
}

/// Result type alias for memtask.
pub type Result<T> = std::result::Result<T, Error>;

//! Job system: priority queue, worker pool, retry policy.
//!
//! Core components:
//! - `model`: Job records and the status state machine (Pending → Running → Completed/Failed)
//! - `store`: Queue/record store interface plus the in-memory implementation
//! - `handler`: Job-type handler registry and the shared dependency bag
//! - `retry`: Exponential backoff
//! - `metrics`: Aggregate counters and queue stats
//! - `processor`: Submission, worker loops, retries, fallback to the local queue

pub mod handler;
pub mod metrics;
pub mod model;
pub mod processor;
pub mod retry;
pub mod store;

pub use handler::{HandlerRegistry, JobDeps, JobHandler, handler_fn};
pub use metrics::{JobMetrics, QueueStats};
pub use model::{Job, JobPriority, JobRequest, JobResult, JobStatus, Payload};
pub use processor::JobProcessor;
pub use retry::RetryPolicy;
pub use store::{InMemoryQueueStore, QueueStore};

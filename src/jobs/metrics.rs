//! Aggregate job processor metrics.

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;

use crate::jobs::model::JobPriority;

/// Snapshot of processor metrics, returned by `JobProcessor::get_metrics`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobMetrics {
    /// Jobs accepted by `submit_job`.
    pub total_jobs: u64,
    pub successful_jobs: u64,
    pub failed_jobs: u64,
    /// Re-enqueues after failed attempts.
    pub retried_jobs: u64,
    /// Mean handler execution time over finished attempts.
    pub average_execution_time: Duration,
    /// Number of finished attempts the mean covers.
    pub timed_attempts: u64,
    pub jobs_by_priority: HashMap<JobPriority, u64>,
    /// Busy workers / pool size (0.0 - 1.0).
    pub worker_utilization: f64,
}

impl JobMetrics {
    pub fn record_submission(&mut self, priority: JobPriority) {
        self.total_jobs += 1;
        *self.jobs_by_priority.entry(priority).or_default() += 1;
    }

    pub fn record_success(&mut self, duration: Duration) {
        self.successful_jobs += 1;
        self.record_duration(duration);
    }

    pub fn record_failure(&mut self, duration: Duration) {
        self.failed_jobs += 1;
        self.record_duration(duration);
    }

    pub fn record_retry(&mut self, duration: Duration) {
        self.retried_jobs += 1;
        self.record_duration(duration);
    }

    // Incremental mean: new_avg = prev_avg + (duration - prev_avg) / count
    fn record_duration(&mut self, duration: Duration) {
        self.timed_attempts += 1;
        let count = self.timed_attempts;
        self.average_execution_time = if count == 1 {
            duration
        } else {
            let prev = self.average_execution_time.as_nanos() as f64;
            let cur = duration.as_nanos() as f64;
            Duration::from_nanos((prev + (cur - prev) / count as f64) as u64)
        };
    }
}

/// Queue depth and worker occupancy, returned by `JobProcessor::get_queue_stats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub running: usize,
    pub workers: usize,
    pub busy_workers: usize,
    /// True once the processor has fallen back to its local queue.
    pub degraded: bool,
}

//! Recurring task definitions.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::SchedulerError;
use crate::jobs::model::{JobPriority, Payload};

/// When a recurring task fires.
#[derive(Debug, Clone)]
pub enum Schedule {
    /// Fixed interval after the previous firing.
    Every(Duration),
    /// Cron expression (seconds field included, e.g. `0 0 3 * * *`).
    Cron {
        expression: String,
        schedule: Box<cron::Schedule>,
    },
}

impl Schedule {
    pub fn every(interval: Duration) -> Result<Self, SchedulerError> {
        if interval.is_zero() {
            return Err(SchedulerError::MalformedSchedule {
                expression: format!("{interval:?}"),
                reason: "interval must be non-zero".to_string(),
            });
        }
        Ok(Self::Every(interval))
    }

    pub fn cron(expression: &str) -> Result<Self, SchedulerError> {
        let schedule = cron::Schedule::from_str(expression).map_err(|e| {
            SchedulerError::MalformedSchedule {
                expression: expression.to_string(),
                reason: format!("invalid cron: {e}"),
            }
        })?;
        Ok(Self::Cron {
            expression: expression.to_string(),
            schedule: Box::new(schedule),
        })
    }

    /// Next firing strictly after `now`. `None` if a cron schedule has no future instant.
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Every(interval) => chrono::Duration::from_std(*interval)
                .ok()
                .and_then(|d| now.checked_add_signed(d)),
            Self::Cron { schedule, .. } => schedule.after(&now).next(),
        }
    }
}

impl std::fmt::Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Every(interval) => write!(f, "every {interval:?}"),
            Self::Cron { expression, .. } => write!(f, "cron '{expression}'"),
        }
    }
}

impl Serialize for Schedule {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

/// A named recurring job submission, owned by the background scheduler.
#[derive(Debug, Clone, Serialize)]
pub struct RecurringTask {
    pub name: String,
    pub job_type: String,
    pub schedule: Schedule,
    /// Payload template copied into every submitted job.
    pub payload: Payload,
    pub priority: JobPriority,
    pub enabled: bool,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
}

impl RecurringTask {
    /// A new task, due immediately.
    pub fn new(
        name: impl Into<String>,
        job_type: impl Into<String>,
        schedule: Schedule,
        payload: Payload,
        priority: JobPriority,
    ) -> Self {
        Self {
            name: name.into(),
            job_type: job_type.into(),
            schedule,
            payload,
            priority,
            enabled: true,
            last_run: None,
            next_run: Some(Utc::now()),
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.next_run.is_some_and(|at| at <= now)
    }

    /// Record a firing at `now` and compute the next one.
    pub fn advance(&mut self, now: DateTime<Utc>) {
        self.last_run = Some(now);
        self.next_run = self.schedule.next_after(now);
    }
}

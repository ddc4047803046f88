//! Job records, status state machine, and results.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;

/// Opaque job payload.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Flat string fields as held by the hash-record store.
pub type Fields = HashMap<String, String>;

/// Job priority. Ordered `Low < Medium < High < Critical`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum JobPriority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl JobPriority {
    pub const ALL: [JobPriority; 4] = [Self::Low, Self::Medium, Self::High, Self::Critical];

    /// Numeric weight used in the queue score.
    pub fn weight(&self) -> i64 {
        match self {
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
            Self::Critical => 4,
        }
    }
}

impl std::fmt::Display for JobPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

impl FromStr for JobPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Queued, waiting for a worker.
    Pending,
    /// Owned by a worker.
    Running,
    /// Handler succeeded.
    Completed,
    /// Handler failed and the retry budget is spent.
    Failed,
    /// Cancelled before it ran.
    Cancelled,
    /// Failed attempt waiting out its backoff before re-enqueue.
    Retrying,
}

impl JobStatus {
    /// Check if this state allows transitioning to another state.
    pub fn can_transition_to(&self, target: JobStatus) -> bool {
        use JobStatus::*;

        matches!(
            (self, target),
            (Pending, Running) | (Pending, Cancelled) |
            (Running, Completed) | (Running, Failed) | (Running, Retrying) |
            (Retrying, Pending) | (Retrying, Cancelled)
        )
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Retrying => "retrying",
        };
        write!(f, "{s}")
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            "retrying" => Ok(Self::Retrying),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// A request to run a job. Built with `JobRequest::new(..).with_*(..)`.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub job_type: String,
    pub payload: Payload,
    pub priority: JobPriority,
    pub scheduled_at: Option<DateTime<Utc>>,
    /// `None` uses the processor default.
    pub max_retries: Option<u32>,
    /// `None` uses the processor default.
    pub timeout: Option<Duration>,
}

impl JobRequest {
    pub fn new(job_type: impl Into<String>, payload: Payload) -> Self {
        Self {
            job_type: job_type.into(),
            payload,
            priority: JobPriority::default(),
            scheduled_at: None,
            max_retries: None,
            timeout: None,
        }
    }

    pub fn with_priority(mut self, priority: JobPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_scheduled_at(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(at);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A unit of background work tracked through its lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    pub id: Uuid,
    pub job_type: String,
    pub priority: JobPriority,
    pub payload: Payload,
    pub status: JobStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    pub timeout: Duration,
    pub created_at: DateTime<Utc>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub worker_id: Option<String>,
    pub error_message: Option<String>,
}

impl Job {
    /// Create a pending job from a request.
    pub fn new(request: JobRequest, max_retries: u32, timeout: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_type: request.job_type,
            priority: request.priority,
            payload: request.payload,
            status: JobStatus::Pending,
            retry_count: 0,
            max_retries,
            timeout,
            created_at: Utc::now(),
            scheduled_at: request.scheduled_at,
            started_at: None,
            completed_at: None,
            worker_id: None,
            error_message: None,
        }
    }

    /// Move to a new status, stamping `started_at`/`completed_at`.
    pub fn transition_to(&mut self, target: JobStatus) -> Result<(), String> {
        if !self.status.can_transition_to(target) {
            return Err(format!(
                "Cannot transition job {} from {} to {}",
                self.id, self.status, target
            ));
        }

        self.status = target;
        match target {
            JobStatus::Running => self.started_at = Some(Utc::now()),
            s if s.is_terminal() => self.completed_at = Some(Utc::now()),
            _ => {}
        }
        Ok(())
    }

    /// Whether a failed attempt still has retry budget left.
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    pub fn record_key(id: Uuid) -> String {
        format!("job:{id}")
    }

    pub fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("id".into(), self.id.to_string());
        fields.insert("type".into(), self.job_type.clone());
        fields.insert("priority".into(), self.priority.to_string());
        fields.insert(
            "payload".into(),
            serde_json::Value::Object(self.payload.clone()).to_string(),
        );
        fields.insert("status".into(), self.status.to_string());
        fields.insert("retry_count".into(), self.retry_count.to_string());
        fields.insert("max_retries".into(), self.max_retries.to_string());
        fields.insert("timeout_ms".into(), self.timeout.as_millis().to_string());
        fields.insert("created_at".into(), self.created_at.to_rfc3339());
        put_opt(&mut fields, "scheduled_at", self.scheduled_at.map(|t| t.to_rfc3339()));
        put_opt(&mut fields, "started_at", self.started_at.map(|t| t.to_rfc3339()));
        put_opt(&mut fields, "completed_at", self.completed_at.map(|t| t.to_rfc3339()));
        put_opt(&mut fields, "worker_id", self.worker_id.clone());
        put_opt(&mut fields, "error_message", self.error_message.clone());
        fields
    }

    pub fn from_fields(fields: &Fields) -> Result<Self, StoreError> {
        let r = FieldReader::new("job", fields);
        let payload = match serde_json::from_str::<serde_json::Value>(r.required("payload")?) {
            Ok(serde_json::Value::Object(map)) => map,
            Ok(_) => return Err(r.corrupt("payload is not an object")),
            Err(e) => return Err(r.corrupt(format!("payload: {e}"))),
        };

        Ok(Self {
            id: r.parse("id")?,
            job_type: r.required("type")?.to_string(),
            priority: r.parse("priority")?,
            payload,
            status: r.parse("status")?,
            retry_count: r.parse("retry_count")?,
            max_retries: r.parse("max_retries")?,
            timeout: Duration::from_millis(r.parse("timeout_ms")?),
            created_at: r.timestamp("created_at")?,
            scheduled_at: r.optional_timestamp("scheduled_at")?,
            started_at: r.optional_timestamp("started_at")?,
            completed_at: r.optional_timestamp("completed_at")?,
            worker_id: r.optional("worker_id"),
            error_message: r.optional("error_message"),
        })
    }
}

/// Outcome of one terminal job attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobResult {
    pub job_id: Uuid,
    pub success: bool,
    pub result: serde_json::Value,
    pub execution_time: Duration,
    pub error: Option<String>,
    pub completed_at: DateTime<Utc>,
    pub worker_id: Option<String>,
}

impl JobResult {
    pub fn record_key(id: Uuid) -> String {
        format!("job_result:{id}")
    }

    pub fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("job_id".into(), self.job_id.to_string());
        fields.insert("success".into(), self.success.to_string());
        fields.insert("result".into(), self.result.to_string());
        fields.insert(
            "execution_time_ms".into(),
            self.execution_time.as_millis().to_string(),
        );
        fields.insert("completed_at".into(), self.completed_at.to_rfc3339());
        put_opt(&mut fields, "error", self.error.clone());
        put_opt(&mut fields, "worker_id", self.worker_id.clone());
        fields
    }

    pub fn from_fields(fields: &Fields) -> Result<Self, StoreError> {
        let r = FieldReader::new("job_result", fields);
        let result = serde_json::from_str(r.required("result")?)
            .map_err(|e| r.corrupt(format!("result: {e}")))?;

        Ok(Self {
            job_id: r.parse("job_id")?,
            success: r.parse("success")?,
            result,
            execution_time: Duration::from_millis(r.parse("execution_time_ms")?),
            error: r.optional("error"),
            completed_at: r.timestamp("completed_at")?,
            worker_id: r.optional("worker_id"),
        })
    }
}

/// Always writes the key; `None` is stored as an empty string so a merge
/// into an existing record clears the old value.
fn put_opt(fields: &mut Fields, key: &str, value: Option<String>) {
    fields.insert(key.to_string(), value.unwrap_or_default());
}

/// Typed access to a hash record, producing `StoreError::Corrupt` on bad data.
struct FieldReader<'a> {
    kind: &'static str,
    fields: &'a Fields,
}

impl<'a> FieldReader<'a> {
    fn new(kind: &'static str, fields: &'a Fields) -> Self {
        Self { kind, fields }
    }

    fn key(&self) -> String {
        let id = self
            .fields
            .get("id")
            .or_else(|| self.fields.get("job_id"))
            .map(String::as_str)
            .unwrap_or("?");
        format!("{}:{}", self.kind, id)
    }

    fn corrupt(&self, reason: impl Into<String>) -> StoreError {
        StoreError::Corrupt {
            key: self.key(),
            reason: reason.into(),
        }
    }

    fn required(&self, name: &str) -> Result<&'a str, StoreError> {
        self.fields
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| self.corrupt(format!("missing field '{name}'")))
    }

    fn optional(&self, name: &str) -> Option<String> {
        self.fields.get(name).filter(|v| !v.is_empty()).cloned()
    }

    fn parse<T>(&self, name: &str) -> Result<T, StoreError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.required(name)?
            .parse()
            .map_err(|e| self.corrupt(format!("field '{name}': {e}")))
    }

    fn timestamp(&self, name: &str) -> Result<DateTime<Utc>, StoreError> {
        DateTime::parse_from_rfc3339(self.required(name)?)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| self.corrupt(format!("field '{name}': {e}")))
    }

    fn optional_timestamp(&self, name: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        match self.fields.get(name) {
            Some(v) if !v.is_empty() => self.timestamp(name).map(Some),
            _ => Ok(None),
        }
    }
}

//! Best-effort audit trail for event execution.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::warn;

use crate::cognition::event::{EventId, EventOutcome};
use crate::error::AuditError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub actor: String,
    pub action: String,
    pub target_id: String,
    pub target_type: String,
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// External audit log.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn log(&self, entry: AuditEntry) -> Result<(), AuditError>;
}

/// Writes entries to the `audit` tracing target.
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn log(&self, entry: AuditEntry) -> Result<(), AuditError> {
        let details =
            serde_json::to_string(&entry.details).map_err(|e| AuditError::Sink(e.to_string()))?;
        tracing::info!(
            target: "audit",
            actor = %entry.actor,
            action = %entry.action,
            target_id = %entry.target_id,
            target_type = %entry.target_type,
            details = %details,
            timestamp = %entry.timestamp.to_rfc3339(),
            "Audit entry"
        );
        Ok(())
    }
}

const ACTOR: &str = "cognitive_engine";

/// Adapter over an optional sink. Sink failures are logged and swallowed.
#[derive(Clone, Default)]
pub struct AuditBroker {
    sink: Option<Arc<dyn AuditSink>>,
}

impl AuditBroker {
    pub fn new(sink: Option<Arc<dyn AuditSink>>) -> Self {
        Self { sink }
    }

    pub async fn log_event_start(&self, id: EventId, name: &str) {
        self.log("event_start", id, json!({ "event": name })).await;
    }

    pub async fn log_event_end(
        &self,
        id: EventId,
        name: &str,
        outcome: Result<&EventOutcome, &str>,
    ) {
        let details = match outcome {
            Ok(outcome) => json!({ "event": name, "outcome": outcome.label() }),
            Err(error) => json!({ "event": name, "outcome": "error", "error": error }),
        };
        self.log("event_end", id, details).await;
    }

    async fn log(&self, action: &str, id: EventId, details: serde_json::Value) {
        let Some(sink) = &self.sink else {
            return;
        };
        let entry = AuditEntry {
            actor: ACTOR.to_string(),
            action: action.to_string(),
            target_id: id.to_string(),
            target_type: "event".to_string(),
            details,
            timestamp: Utc::now(),
        };
        if let Err(e) = sink.log(entry).await {
            warn!(event_id = %id, action, error = %e, "Audit log failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        entries: Mutex<Vec<AuditEntry>>,
    }

    #[async_trait]
    impl AuditSink for RecordingSink {
        async fn log(&self, entry: AuditEntry) -> Result<(), AuditError> {
            self.entries.lock().await.push(entry);
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl AuditSink for FailingSink {
        async fn log(&self, _entry: AuditEntry) -> Result<(), AuditError> {
            Err(AuditError::Sink("disk full".into()))
        }
    }

    #[tokio::test]
    async fn records_start_and_end() {
        let sink = Arc::new(RecordingSink::default());
        let broker = AuditBroker::new(Some(sink.clone()));
        let id = EventId::of("extract");

        broker.log_event_start(id, "extract").await;
        broker
            .log_event_end(id, "extract", Ok(&EventOutcome::Abort))
            .await;
        broker.log_event_end(id, "extract", Err("boom")).await;

        let entries = sink.entries.lock().await;
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].action, "event_start");
        assert_eq!(entries[0].actor, "cognitive_engine");
        assert_eq!(entries[0].target_id, id.to_string());
        assert_eq!(entries[1].details["outcome"], "abort");
        assert_eq!(entries[2].details["error"], "boom");
    }

    #[tokio::test]
    async fn sink_failures_are_swallowed() {
        let broker = AuditBroker::new(Some(Arc::new(FailingSink)));
        broker.log_event_start(EventId::of("x"), "x").await;

        AuditBroker::default()
            .log_event_start(EventId::of("x"), "x")
            .await;
        TracingAuditSink
            .log(AuditEntry {
                actor: "test".into(),
                action: "noop".into(),
                target_id: "1".into(),
                target_type: "event".into(),
                details: json!({}),
                timestamp: Utc::now(),
            })
            .await
            .unwrap();
    }
}

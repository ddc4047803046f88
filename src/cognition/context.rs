//! Per-invocation run state.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::cognition::event::{EventId, EventOutcome};
use crate::cognition::group::DispatchKey;

#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub outcome: EventOutcome,
    /// Dispatch keys already fired through this event.
    pub sent: HashSet<DispatchKey>,
}

/// Results and dispatch-dedup state of one `invoke_event` call.
///
/// Only the coordinating loop writes to it; handler tasks never see it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunContext {
    records: HashMap<EventId, EventRecord>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an outcome. A re-run replaces the outcome but keeps the sent keys.
    pub fn record(&mut self, id: EventId, outcome: EventOutcome) {
        self.records
            .entry(id)
            .and_modify(|r| r.outcome = outcome.clone())
            .or_insert_with(|| EventRecord {
                outcome,
                sent: HashSet::new(),
            });
    }

    pub fn get(&self, id: &EventId) -> Option<&EventRecord> {
        self.records.get(id)
    }

    pub fn outcome(&self, id: &EventId) -> Option<&EventOutcome> {
        self.records.get(id).map(|r| &r.outcome)
    }

    /// The value result of `id`. Special returns have none.
    pub fn result(&self, id: &EventId) -> Option<&Value> {
        self.outcome(id).and_then(EventOutcome::value)
    }

    pub fn has_result(&self, id: &EventId) -> bool {
        self.result(id).is_some()
    }

    pub fn is_sent(&self, id: &EventId, key: &DispatchKey) -> bool {
        self.records.get(id).is_some_and(|r| r.sent.contains(key))
    }

    pub fn mark_sent(&mut self, id: &EventId, key: DispatchKey) {
        if let Some(record) = self.records.get_mut(id) {
            record.sent.insert(key);
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EventId, &EventRecord)> {
        self.records.iter()
    }
}

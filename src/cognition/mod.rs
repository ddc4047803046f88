//! Event-driven DAG engine for multi-step reasoning workflows.
//!
//! - `event`: `Event`, `EventId`, handler trait and outcomes
//! - `group`: dependency groups and retrigger policies
//! - `context`: per-invocation `RunContext`
//! - `audit`: best-effort audit broker and sinks
//! - `engine`: registry and `invoke_event`

pub mod audit;
pub mod context;
pub mod engine;
pub mod event;
pub mod group;

pub use audit::{AuditBroker, AuditEntry, AuditSink, TracingAuditSink};
pub use context::{EventRecord, RunContext};
pub use engine::CognitiveEngine;
pub use event::{
    Behavior, Event, EventHandler, EventId, EventInput, EventOutcome, GlobalContext,
    make_event_fn,
};
pub use group::{DispatchKey, EventGroup, RetriggerPolicy};

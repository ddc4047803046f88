//! Events: DAG nodes wrapping one asynchronous handler.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::cognition::group::EventGroup;

/// Deterministic identity of an event, derived from its handler's name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(u64);

impl EventId {
    pub fn of(handler_name: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        handler_name.hash(&mut hasher);
        Self(hasher.finish())
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// What a handler returns.
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    /// A result; downstream groups containing this event may fire.
    Value(Value),
    /// Stop this branch. Nothing downstream is dispatched.
    Abort,
    /// Jump request naming a group. Treated like `Abort`.
    Goto(String),
}

impl EventOutcome {
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Value(_) => "value",
            Self::Abort => "abort",
            Self::Goto(_) => "goto",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Behavior {
    #[default]
    Dispatch,
}

/// Input handed to a dispatched event: the results of the group that fired it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventInput {
    pub group_name: String,
    pub results: HashMap<EventId, Value>,
    pub behavior: Behavior,
}

impl EventInput {
    pub fn new(group_name: impl Into<String>, results: HashMap<EventId, Value>) -> Self {
        Self {
            group_name: group_name.into(),
            results,
            behavior: Behavior::Dispatch,
        }
    }

    pub fn result_of(&self, id: &EventId) -> Option<&Value> {
        self.results.get(id)
    }
}

/// Invocation-wide context shared read-only with every handler.
pub type GlobalContext = Arc<Value>;

/// The work behind an event. `name()` is the identity the event id is derived from.
#[async_trait]
pub trait EventHandler: Send + Sync {
    fn name(&self) -> &str;

    async fn run(
        &self,
        input: Option<EventInput>,
        global: Option<GlobalContext>,
    ) -> anyhow::Result<EventOutcome>;
}

pub struct FnEventHandler<F> {
    name: String,
    f: F,
}

#[async_trait]
impl<F, Fut> EventHandler for FnEventHandler<F>
where
    F: Fn(Option<EventInput>, Option<GlobalContext>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<EventOutcome>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(
        &self,
        input: Option<EventInput>,
        global: Option<GlobalContext>,
    ) -> anyhow::Result<EventOutcome> {
        (self.f)(input, global).await
    }
}

/// Wrap a named async closure as an event handler.
pub fn make_event_fn<F, Fut>(name: impl Into<String>, f: F) -> Arc<dyn EventHandler>
where
    F: Fn(Option<EventInput>, Option<GlobalContext>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<EventOutcome>> + Send + 'static,
{
    Arc::new(FnEventHandler {
        name: name.into(),
        f,
    })
}

/// A registered DAG node.
#[derive(Clone)]
pub struct Event {
    pub id: EventId,
    pub display_name: String,
    pub(crate) handler: Arc<dyn EventHandler>,
    /// Groups this event depends on, keyed by group hash.
    pub parent_groups: HashMap<u64, EventGroup>,
}

impl Event {
    pub(crate) fn new(handler: Arc<dyn EventHandler>) -> Self {
        let display_name = handler.name().to_string();
        Self {
            id: EventId::of(&display_name),
            display_name,
            handler,
            parent_groups: HashMap::new(),
        }
    }

    /// True if this event listens on a group containing `member`.
    pub fn depends_on(&self, member: &EventId) -> bool {
        self.parent_groups
            .values()
            .any(|g| g.members.contains(member))
    }
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .field("parent_groups", &self.parent_groups)
            .finish()
    }
}

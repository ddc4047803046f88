//! Cognitive engine: event registry and the concurrent DAG runner.
//!
//! `invoke_event` seeds a work queue with the root event and drives a
//! `JoinSet` of handler tasks. Each completion is folded into the
//! invocation's `RunContext` by the coordinating loop, which then decides
//! which downstream events fire:
//!
//! - `All` groups fire once per invocation, when every member has a value.
//!   The dispatch key is marked on every member so a second completion in
//!   the same pass cannot fire the group again.
//! - `Any` groups fire on every member completion once all members have a
//!   value, so a member that runs again fires the group again.
//! - `Abort` and `Goto` outcomes fire nothing.
//!
//! The first handler error or panic aborts every outstanding task and
//! surfaces as an `EventError`.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::RwLock;
use tokio::task::{self, JoinSet};
use tracing::{debug, error, info, warn};

use crate::cognition::audit::{AuditBroker, AuditSink};
use crate::cognition::context::RunContext;
use crate::cognition::event::{
    Event, EventHandler, EventId, EventInput, EventOutcome, GlobalContext,
};
use crate::cognition::group::{DispatchKey, EventGroup, RetriggerPolicy};
use crate::config::EngineConfig;
use crate::error::EventError;

type TaskReport = (EventId, Result<EventOutcome, EventError>);

pub struct CognitiveEngine {
    config: EngineConfig,
    events: RwLock<HashMap<EventId, Event>>,
    audit: AuditBroker,
}

impl CognitiveEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            events: RwLock::new(HashMap::new()),
            audit: AuditBroker::default(),
        }
    }

    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = AuditBroker::new(Some(sink));
        self
    }

    /// Register a handler as an event. Registering the same handler name
    /// again swaps the handler and keeps the event's groups.
    pub async fn make_event(&self, handler: Arc<dyn EventHandler>) -> Event {
        let mut events = self.events.write().await;
        let id = EventId::of(handler.name());
        match events.get_mut(&id) {
            Some(event) => {
                event.handler = handler;
                debug!(event = %event.display_name, id = %id, "Re-registered event");
                event.clone()
            }
            None => {
                let event = Event::new(handler);
                debug!(event = %event.display_name, id = %id, "Registered event");
                events.insert(id, event.clone());
                event
            }
        }
    }

    /// Register `handler` as an event that runs when `dependencies` complete.
    pub async fn listen_group(
        &self,
        handler: Arc<dyn EventHandler>,
        dependencies: &[&Event],
        name: Option<&str>,
        policy: RetriggerPolicy,
    ) -> Result<Event, EventError> {
        if dependencies.is_empty() {
            return Err(EventError::InvalidGroup {
                reason: "a group needs at least one dependency".to_string(),
            });
        }
        let group = EventGroup::new(name, dependencies.iter().map(|e| e.id), policy);

        let mut events = self.events.write().await;
        let id = EventId::of(handler.name());
        let event = events
            .entry(id)
            .or_insert_with(|| Event::new(Arc::clone(&handler)));
        event.handler = handler;

        if event.parent_groups.get(&group.hash) == Some(&group) {
            debug!(event = %event.display_name, group = %group.name, "Group already declared");
        } else {
            info!(
                event = %event.display_name,
                group = %group.name,
                members = group.members.len(),
                policy = %group.policy,
                "Event listening on group"
            );
            event.parent_groups.insert(group.hash, group);
        }
        Ok(event.clone())
    }

    pub async fn get_event_from_id(&self, id: &EventId) -> Option<Event> {
        self.events.read().await.get(id).cloned()
    }

    /// All registered events, sorted by name.
    pub async fn events(&self) -> Vec<Event> {
        let mut events: Vec<Event> = self.events.read().await.values().cloned().collect();
        events.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        events
    }

    /// Run the DAG rooted at `root` to completion.
    ///
    /// `max_async_events` caps concurrently running handlers; `None` falls back
    /// to the engine config.
    pub async fn invoke_event(
        &self,
        root: &EventId,
        input: Option<EventInput>,
        global: Option<GlobalContext>,
        max_async_events: Option<usize>,
    ) -> Result<RunContext, EventError> {
        self.invoke_event_until(root, input, global, max_async_events, std::future::pending())
            .await
    }

    /// Like [`invoke_event`](Self::invoke_event), but gives up with
    /// `EventError::Cancelled` once `cancel` resolves. Outstanding handlers are
    /// aborted and awaited before returning.
    pub async fn invoke_event_until(
        &self,
        root: &EventId,
        input: Option<EventInput>,
        global: Option<GlobalContext>,
        max_async_events: Option<usize>,
        cancel: impl Future<Output = ()>,
    ) -> Result<RunContext, EventError> {
        // The graph is fixed for the duration of one invocation.
        let registry = self.events.read().await.clone();
        if !registry.contains_key(root) {
            return Err(EventError::NotFound {
                id: root.to_string(),
            });
        }

        let limit = max_async_events
            .or(self.config.max_async_events)
            .filter(|n| *n > 0);
        let mut cancel = std::pin::pin!(cancel);
        let mut queue: VecDeque<(EventId, Option<EventInput>)> = VecDeque::from([(*root, input)]);
        let mut tasks: JoinSet<TaskReport> = JoinSet::new();
        // Names of running tasks, for panics that escape the handler guard.
        let mut running: HashMap<task::Id, String> = HashMap::new();
        let mut ctx = RunContext::new();
        let mut dispatched = 0usize;

        loop {
            while limit.is_none_or(|n| tasks.len() < n) {
                let Some((id, input)) = queue.pop_front() else {
                    break;
                };
                let Some(event) = registry.get(&id) else {
                    warn!(id = %id, "Dispatched event is not registered, skipping");
                    continue;
                };
                dispatched += 1;
                if dispatched > self.config.max_dispatches {
                    error!(
                        limit = self.config.max_dispatches,
                        "Dispatch limit exceeded, aborting invocation"
                    );
                    tasks.shutdown().await;
                    return Err(EventError::DispatchLimitExceeded {
                        limit: self.config.max_dispatches,
                    });
                }
                let task_id =
                    spawn_event(&mut tasks, event, input, global.clone(), self.audit.clone());
                running.insert(task_id, event.display_name.clone());
            }

            if tasks.is_empty() {
                break;
            }

            let joined = tokio::select! {
                biased;
                _ = &mut cancel => {
                    info!(outstanding = tasks.len(), "Invocation cancelled");
                    tasks.shutdown().await;
                    return Err(EventError::Cancelled);
                }
                joined = tasks.join_next_with_id() => joined,
            };

            match joined {
                Some(Ok((task_id, (id, Ok(outcome))))) => {
                    running.remove(&task_id);
                    let fires = match &outcome {
                        EventOutcome::Value(_) => true,
                        EventOutcome::Abort => {
                            debug!(id = %id, "Event aborted its branch");
                            false
                        }
                        EventOutcome::Goto(target) => {
                            info!(
                                id = %id,
                                target = %target,
                                "Goto is not supported, stopping branch"
                            );
                            false
                        }
                    };
                    ctx.record(id, outcome);
                    if fires {
                        queue.extend(
                            dispatch_children(&registry, &id, &mut ctx)
                                .into_iter()
                                .map(|(child, input)| (child, Some(input))),
                        );
                    }
                }
                Some(Ok((_, (id, Err(e))))) => {
                    error!(id = %id, error = %e, "Event failed, cancelling invocation");
                    tasks.shutdown().await;
                    return Err(e);
                }
                Some(Err(e)) => {
                    let event = running
                        .remove(&e.id())
                        .unwrap_or_else(|| "<unknown>".to_string());
                    tasks.shutdown().await;
                    if e.is_cancelled() {
                        return Err(EventError::Cancelled);
                    }
                    error!(event = %event, "Event task panicked, cancelling invocation");
                    return Err(EventError::Panicked { event });
                }
                None => break,
            }
        }

        info!(root = %root, events = ctx.len(), dispatched, "Invocation finished");
        Ok(ctx)
    }
}

fn spawn_event(
    tasks: &mut JoinSet<TaskReport>,
    event: &Event,
    input: Option<EventInput>,
    global: Option<GlobalContext>,
    audit: AuditBroker,
) -> task::Id {
    let id = event.id;
    let name = event.display_name.clone();
    let handler = Arc::clone(&event.handler);

    tasks.spawn(async move {
        audit.log_event_start(id, &name).await;
        let result = match AssertUnwindSafe(handler.run(input, global))
            .catch_unwind()
            .await
        {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(e)) => Err(EventError::HandlerFailed {
                event: name.clone(),
                reason: format!("{e:#}"),
            }),
            Err(_) => Err(EventError::Panicked {
                event: name.clone(),
            }),
        };
        match &result {
            Ok(outcome) => audit.log_event_end(id, &name, Ok(outcome)).await,
            Err(e) => audit.log_event_end(id, &name, Err(&e.to_string())).await,
        }
        (id, result)
    })
    .id()
}

/// Find every downstream event that fires because `completed` just finished.
fn dispatch_children(
    registry: &HashMap<EventId, Event>,
    completed: &EventId,
    ctx: &mut RunContext,
) -> Vec<(EventId, EventInput)> {
    let mut fired = Vec::new();

    for candidate in registry.values() {
        for group in candidate.parent_groups.values() {
            if !group.members.contains(completed) {
                continue;
            }

            if !group.members.iter().all(|m| ctx.has_result(m)) {
                continue;
            }
            let key = DispatchKey {
                event: candidate.id,
                group: group.hash,
            };
            if group.policy == RetriggerPolicy::All
                && group.members.iter().any(|m| ctx.is_sent(m, &key))
            {
                continue;
            }
            for member in &group.members {
                ctx.mark_sent(member, key);
            }

            let results = group
                .members
                .iter()
                .filter_map(|m| ctx.result(m).map(|v| (*m, v.clone())))
                .collect();
            debug!(
                event = %candidate.display_name,
                group = %group.name,
                trigger = %completed,
                "Dispatching event"
            );
            fired.push((candidate.id, EventInput::new(group.name.clone(), results)));
        }
    }

    fired
}

//! Dependency groups.

use std::collections::BTreeSet;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::cognition::event::EventId;

/// When a group dispatches its downstream event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RetriggerPolicy {
    /// Once per invocation, after every member has a result.
    #[default]
    All,
    /// On every member completion once all members have a result. A member
    /// that runs again fires the group again.
    Any,
}

impl std::fmt::Display for RetriggerPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Any => write!(f, "any"),
        }
    }
}

/// A set of events a downstream event depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventGroup {
    pub name: String,
    /// Order-independent hash of `members`.
    pub hash: u64,
    pub members: BTreeSet<EventId>,
    pub policy: RetriggerPolicy,
}

impl EventGroup {
    /// Build a group. Without a name, the group is named after its hash.
    pub fn new(
        name: Option<&str>,
        members: impl IntoIterator<Item = EventId>,
        policy: RetriggerPolicy,
    ) -> Self {
        let members: BTreeSet<EventId> = members.into_iter().collect();
        let hash = group_hash(&members);
        Self {
            name: name
                .map(str::to_string)
                .unwrap_or_else(|| format!("group-{hash:016x}")),
            hash,
            members,
            policy,
        }
    }
}

/// Hash of the sorted member set.
pub fn group_hash(members: &BTreeSet<EventId>) -> u64 {
    let mut hasher = DefaultHasher::new();
    for member in members {
        member.hash(&mut hasher);
    }
    hasher.finish()
}

/// Dedupe key for one (downstream event, group) dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DispatchKey {
    pub event: EventId,
    pub group: u64,
}

//! Queue/record store interface and the in-memory implementation.
//!
//! The store offers a scored queue (push / pop-min) and hash records with
//! per-key expiry. `pop_min` is the only synchronization point between
//! workers: a member is handed to exactly one caller.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

use crate::error::StoreError;
use crate::jobs::model::Fields;

/// Backend-agnostic queue and record store.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Add `member` to `queue` with `score`, replacing any previous score.
    async fn push(&self, queue: &str, member: &str, score: i64) -> Result<(), StoreError>;

    /// Remove and return the member with the lowest score.
    async fn pop_min(&self, queue: &str) -> Result<Option<String>, StoreError>;

    /// Number of members currently in `queue`.
    async fn queue_len(&self, queue: &str) -> Result<usize, StoreError>;

    /// Write (merge) fields into the hash at `key`.
    async fn hash_set(&self, key: &str, fields: Fields) -> Result<(), StoreError>;

    /// Read every field of the hash at `key`. `None` if absent or expired.
    async fn hash_get_all(&self, key: &str) -> Result<Option<Fields>, StoreError>;

    /// Expire `key` after `ttl`.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError>;
}

#[derive(Default)]
struct ScoredQueue {
    ordered: BTreeSet<(i64, String)>,
    scores: HashMap<String, i64>,
}

struct HashRecord {
    fields: Fields,
    expires_at: Option<Instant>,
}

impl HashRecord {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Process-local store. Records survive only for the process lifetime.
#[derive(Default)]
pub struct InMemoryQueueStore {
    queues: RwLock<HashMap<String, ScoredQueue>>,
    hashes: RwLock<HashMap<String, HashRecord>>,
}

impl InMemoryQueueStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Drop every expired hash record. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut hashes = self.hashes.write().await;
        let before = hashes.len();
        hashes.retain(|_, record| !record.is_expired(now));
        let purged = before - hashes.len();
        if purged > 0 {
            debug!(purged, "Purged expired records");
        }
        purged
    }

    /// Number of hash records held, expired or not.
    pub async fn record_count(&self) -> usize {
        self.hashes.read().await.len()
    }
}

#[async_trait]
impl QueueStore for InMemoryQueueStore {
    async fn push(&self, queue: &str, member: &str, score: i64) -> Result<(), StoreError> {
        let mut queues = self.queues.write().await;
        let q = queues.entry(queue.to_string()).or_default();
        if let Some(old) = q.scores.insert(member.to_string(), score) {
            q.ordered.remove(&(old, member.to_string()));
        }
        q.ordered.insert((score, member.to_string()));
        Ok(())
    }

    async fn pop_min(&self, queue: &str) -> Result<Option<String>, StoreError> {
        let mut queues = self.queues.write().await;
        let Some(q) = queues.get_mut(queue) else {
            return Ok(None);
        };
        let Some((_, member)) = q.ordered.pop_first() else {
            return Ok(None);
        };
        q.scores.remove(&member);
        Ok(Some(member))
    }

    async fn queue_len(&self, queue: &str) -> Result<usize, StoreError> {
        Ok(self
            .queues
            .read()
            .await
            .get(queue)
            .map(|q| q.ordered.len())
            .unwrap_or(0))
    }

    async fn hash_set(&self, key: &str, fields: Fields) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut hashes = self.hashes.write().await;
        let record = hashes.entry(key.to_string()).or_insert_with(|| HashRecord {
            fields: Fields::new(),
            expires_at: None,
        });
        if record.is_expired(now) {
            record.fields.clear();
            record.expires_at = None;
        }
        record.fields.extend(fields);
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> Result<Option<Fields>, StoreError> {
        let now = Instant::now();
        Ok(self
            .hashes
            .read()
            .await
            .get(key)
            .filter(|record| !record.is_expired(now))
            .map(|record| record.fields.clone()))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        if let Some(record) = self.hashes.write().await.get_mut(key) {
            record.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }
}

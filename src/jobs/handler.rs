//! Job-type handler registry.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::jobs::model::Payload;

/// Shared services handed to every job handler (memory store handles, clients, ...).
///
/// Services are keyed by name and recovered by type with [`JobDeps::get`].
#[derive(Clone, Default)]
pub struct JobDeps {
    services: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl JobDeps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<T: Any + Send + Sync>(mut self, name: impl Into<String>, service: Arc<T>) -> Self {
        self.services.insert(name.into(), service);
        self
    }

    /// Look up a service by name, returning `None` on a missing name or a type mismatch.
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.services
            .get(name)
            .cloned()
            .and_then(|s| s.downcast::<T>().ok())
    }
}

impl std::fmt::Debug for JobDeps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobDeps")
            .field("services", &self.services.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Executes one job type.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, payload: Payload, deps: JobDeps) -> anyhow::Result<serde_json::Value>;
}

/// Adapter turning an async closure into a [`JobHandler`].
pub struct FnJobHandler<F>(F);

#[async_trait]
impl<F, Fut> JobHandler for FnJobHandler<F>
where
    F: Fn(Payload, JobDeps) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<serde_json::Value>> + Send,
{
    async fn handle(&self, payload: Payload, deps: JobDeps) -> anyhow::Result<serde_json::Value> {
        (self.0)(payload, deps).await
    }
}

/// Wrap an async closure as a handler.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn JobHandler>
where
    F: Fn(Payload, JobDeps) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<serde_json::Value>> + Send + 'static,
{
    Arc::new(FnJobHandler(f))
}

/// Closed map from job type to handler, populated at startup.
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn JobHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Register a handler, replacing any previous handler for the type.
    pub async fn register(&self, job_type: impl Into<String>, handler: Arc<dyn JobHandler>) {
        let job_type = job_type.into();
        if self
            .handlers
            .write()
            .await
            .insert(job_type.clone(), handler)
            .is_some()
        {
            tracing::warn!(job_type = %job_type, "Replaced existing job handler");
        } else {
            tracing::debug!(job_type = %job_type, "Registered job handler");
        }
    }

    pub async fn get(&self, job_type: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.read().await.get(job_type).cloned()
    }

    pub async fn has(&self, job_type: &str) -> bool {
        self.handlers.read().await.contains_key(job_type)
    }

    pub async fn list(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.read().await.keys().cloned().collect();
        types.sort();
        types
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingHandler;

    #[async_trait]
    impl JobHandler for CountingHandler {
        async fn handle(
            &self,
            payload: Payload,
            _deps: JobDeps,
        ) -> anyhow::Result<serde_json::Value> {
            Ok(serde_json::json!({ "keys": payload.len() }))
        }
    }

    #[tokio::test]
    async fn register_and_get() {
        let registry = HandlerRegistry::new();
        registry.register("decay_scoring", Arc::new(CountingHandler)).await;

        assert!(registry.has("decay_scoring").await);
        assert!(!registry.has("consolidation").await);

        let handler = registry.get("decay_scoring").await.unwrap();
        let out = handler.handle(Payload::new(), JobDeps::new()).await.unwrap();
        assert_eq!(out["keys"], 0);
    }

    #[tokio::test]
    async fn closure_handlers() {
        let registry = HandlerRegistry::new();
        registry
            .register(
                "echo",
                handler_fn(|payload, _deps| async move { Ok(serde_json::Value::Object(payload)) }),
            )
            .await;

        let mut payload = Payload::new();
        payload.insert("x".into(), serde_json::json!(1));
        let out = registry
            .get("echo")
            .await
            .unwrap()
            .handle(payload, JobDeps::new())
            .await
            .unwrap();
        assert_eq!(out["x"], 1);
        assert_eq!(registry.list().await, vec!["echo".to_string()]);
    }

    #[test]
    fn deps_lookup_by_type() {
        let deps = JobDeps::new().with("threshold", Arc::new(0.25_f64));
        assert_eq!(deps.get::<f64>("threshold").as_deref(), Some(&0.25));
        assert!(deps.get::<String>("threshold").is_none());
        assert!(deps.get::<f64>("missing").is_none());
    }
}

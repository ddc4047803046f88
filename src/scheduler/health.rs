//! Health snapshots consumed by the background scheduler.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::jobs::JobProcessor;

/// Overall or per-component health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    pub detail: Option<String>,
}

impl ComponentHealth {
    pub fn healthy() -> Self {
        Self {
            status: HealthStatus::Healthy,
            detail: None,
        }
    }

    pub fn degraded(detail: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Degraded,
            detail: Some(detail.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub components: HashMap<String, ComponentHealth>,
}

impl HealthReport {
    /// Overall status is degraded if any component is.
    pub fn from_components(components: HashMap<String, ComponentHealth>) -> Self {
        let status = if components
            .values()
            .any(|c| c.status == HealthStatus::Degraded)
        {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };
        Self { status, components }
    }

    pub fn is_degraded(&self) -> bool {
        self.status == HealthStatus::Degraded
    }
}

/// Supplies system health to the scheduler.
#[async_trait]
pub trait HealthMonitor: Send + Sync {
    async fn check_health(&self) -> HealthReport;
}

/// Reports degraded health when the job queue backs up or the processor has
/// lost its durable store.
pub struct LoadMonitor {
    processor: Arc<JobProcessor>,
    backpressure_threshold: usize,
}

impl LoadMonitor {
    pub fn new(processor: Arc<JobProcessor>, backpressure_threshold: usize) -> Self {
        Self {
            processor,
            backpressure_threshold,
        }
    }
}

#[async_trait]
impl HealthMonitor for LoadMonitor {
    async fn check_health(&self) -> HealthReport {
        let mut components = HashMap::new();

        match self.processor.get_queue_stats().await {
            Ok(stats) => {
                let queue = if stats.pending > self.backpressure_threshold {
                    ComponentHealth::degraded(format!(
                        "{} pending jobs exceeds threshold {}",
                        stats.pending, self.backpressure_threshold
                    ))
                } else {
                    ComponentHealth::healthy()
                };
                components.insert("queue".to_string(), queue);

                let store = if stats.degraded {
                    ComponentHealth::degraded("running on in-memory fallback queue")
                } else {
                    ComponentHealth::healthy()
                };
                components.insert("store".to_string(), store);
            }
            Err(e) => {
                components.insert(
                    "queue".to_string(),
                    ComponentHealth::degraded(format!("queue stats unavailable: {e}")),
                );
            }
        }

        HealthReport::from_components(components)
    }
}

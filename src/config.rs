//! Configuration types.
//!
//! Every config reads from `MEMTASK_*` environment variables. Unparsable values
//! fall back to the defaults; `validate()` rejects values that cannot work.

use std::time::Duration;

use crate::error::ConfigError;

/// Job processor configuration.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Number of worker loops started by `JobProcessor::start`.
    pub worker_count: usize,
    /// Upper bound on how long an idle worker waits before polling again.
    pub idle_poll_interval: Duration,
    /// Timeout applied to jobs submitted without one.
    pub default_timeout: Duration,
    /// Retry budget applied to jobs submitted without one.
    pub default_max_retries: u32,
    /// Backoff base; the n-th retry waits `base * 2^n`.
    pub retry_base_delay: Duration,
    /// Backoff ceiling.
    pub retry_max_delay: Duration,
    /// Expiry applied to job and result records.
    pub record_ttl: Duration,
    /// Cadence of the sweep that frees expired records in the local store.
    pub purge_interval: Duration,
    /// How long `stop()` waits for in-flight jobs before aborting workers.
    pub shutdown_grace: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            idle_poll_interval: Duration::from_millis(1000),
            default_timeout: Duration::from_secs(300),
            default_max_retries: 3,
            retry_base_delay: Duration::from_secs(30),
            retry_max_delay: Duration::from_secs(300),
            record_ttl: Duration::from_secs(7 * 24 * 3600), // 7 days
            purge_interval: Duration::from_secs(600),
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

impl ProcessorConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let d = Self::default();
        Self {
            worker_count: parse_or(&lookup, "MEMTASK_WORKERS", d.worker_count),
            idle_poll_interval: millis_or(&lookup, "MEMTASK_IDLE_POLL_MS", d.idle_poll_interval),
            default_timeout: secs_or(&lookup, "MEMTASK_JOB_TIMEOUT_SECS", d.default_timeout),
            default_max_retries: parse_or(&lookup, "MEMTASK_MAX_RETRIES", d.default_max_retries),
            retry_base_delay: secs_or(&lookup, "MEMTASK_RETRY_BASE_SECS", d.retry_base_delay),
            retry_max_delay: secs_or(&lookup, "MEMTASK_RETRY_MAX_SECS", d.retry_max_delay),
            record_ttl: secs_or(&lookup, "MEMTASK_RECORD_TTL_SECS", d.record_ttl),
            purge_interval: secs_or(&lookup, "MEMTASK_PURGE_INTERVAL_SECS", d.purge_interval),
            shutdown_grace: secs_or(&lookup, "MEMTASK_SHUTDOWN_GRACE_SECS", d.shutdown_grace),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_count == 0 {
            return Err(invalid("worker_count", "must be at least 1"));
        }
        if self.idle_poll_interval.is_zero() {
            return Err(invalid("idle_poll_interval", "must be non-zero"));
        }
        if self.purge_interval.is_zero() {
            return Err(invalid("purge_interval", "must be non-zero"));
        }
        if self.retry_max_delay < self.retry_base_delay {
            return Err(invalid(
                "retry_max_delay",
                "must not be smaller than retry_base_delay",
            ));
        }
        Ok(())
    }
}

/// Background scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Cadence of the tick loop.
    pub tick_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(60),
        }
    }
}

impl SchedulerConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            tick_interval: secs_or(&lookup, "MEMTASK_TICK_SECS", Self::default().tick_interval),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval.is_zero() {
            return Err(invalid("tick_interval", "must be non-zero"));
        }
        Ok(())
    }
}

/// Cognitive engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Default cap on concurrently running events per invocation (`None` = unbounded).
    pub max_async_events: Option<usize>,
    /// Maximum number of event runs dispatched in a single invocation.
    pub max_dispatches: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_async_events: None,
            max_dispatches: 10_000,
        }
    }
}

impl EngineConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let d = Self::default();
        Self {
            max_async_events: lookup("MEMTASK_MAX_ASYNC_EVENTS")
                .and_then(|s| s.parse::<usize>().ok())
                .filter(|n| *n > 0)
                .or(d.max_async_events),
            max_dispatches: parse_or(&lookup, "MEMTASK_MAX_DISPATCHES", d.max_dispatches),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_async_events == Some(0) {
            return Err(invalid("max_async_events", "must be at least 1 when set"));
        }
        if self.max_dispatches == 0 {
            return Err(invalid("max_dispatches", "must be at least 1"));
        }
        Ok(())
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key)
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn secs_or(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: Duration) -> Duration {
    lookup(key)
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

fn millis_or(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: Duration) -> Duration {
    lookup(key)
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn processor_defaults() {
        let config = ProcessorConfig::default();
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.default_max_retries, 3);
        assert_eq!(config.retry_base_delay, Duration::from_secs(30));
        assert_eq!(config.retry_max_delay, Duration::from_secs(300));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn processor_from_lookup_overrides() {
        let config = ProcessorConfig::from_lookup(lookup_from(&[
            ("MEMTASK_WORKERS", "8"),
            ("MEMTASK_IDLE_POLL_MS", "250"),
            ("MEMTASK_RETRY_BASE_SECS", "5"),
        ]));
        assert_eq!(config.worker_count, 8);
        assert_eq!(config.idle_poll_interval, Duration::from_millis(250));
        assert_eq!(config.retry_base_delay, Duration::from_secs(5));
        assert_eq!(config.default_timeout, Duration::from_secs(300));
    }

    #[test]
    fn unparsable_values_fall_back() {
        let config = ProcessorConfig::from_lookup(lookup_from(&[("MEMTASK_WORKERS", "lots")]));
        assert_eq!(config.worker_count, 4);
    }

    #[test]
    fn validate_rejects_zero_workers() {
        let config = ProcessorConfig {
            worker_count: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { key, .. }) if key == "worker_count"
        ));
    }

    #[test]
    fn validate_rejects_inverted_backoff() {
        let config = ProcessorConfig {
            retry_base_delay: Duration::from_secs(60),
            retry_max_delay: Duration::from_secs(10),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn engine_max_async_events() {
        let unbounded = EngineConfig::from_lookup(lookup_from(&[]));
        assert_eq!(unbounded.max_async_events, None);

        let capped = EngineConfig::from_lookup(lookup_from(&[("MEMTASK_MAX_ASYNC_EVENTS", "4")]));
        assert_eq!(capped.max_async_events, Some(4));

        let zero = EngineConfig::from_lookup(lookup_from(&[("MEMTASK_MAX_ASYNC_EVENTS", "0")]));
        assert_eq!(zero.max_async_events, None);
    }

    #[test]
    fn scheduler_tick() {
        let config = SchedulerConfig::from_lookup(lookup_from(&[("MEMTASK_TICK_SECS", "15")]));
        assert_eq!(config.tick_interval, Duration::from_secs(15));
        assert!(config.validate().is_ok());
    }
}

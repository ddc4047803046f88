//! Background scheduler: a single tick loop that submits due recurring tasks
//! to the job processor.
//!
//! Low-priority tasks are gated on system health: while the health monitor
//! reports `degraded`, their firings are skipped (but still count as runs, so
//! the next attempt is a full interval later).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;
use crate::error::SchedulerError;
use crate::jobs::{JobPriority, JobProcessor, JobRequest, Payload};
use crate::scheduler::health::HealthMonitor;
use crate::scheduler::task::{RecurringTask, Schedule};

pub struct BackgroundScheduler {
    config: SchedulerConfig,
    processor: Arc<JobProcessor>,
    health: Option<Arc<dyn HealthMonitor>>,
    tasks: RwLock<HashMap<String, RecurringTask>>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl BackgroundScheduler {
    pub fn new(config: SchedulerConfig, processor: Arc<JobProcessor>) -> Self {
        Self {
            config,
            processor,
            health: None,
            tasks: RwLock::new(HashMap::new()),
            ticker: Mutex::new(None),
        }
    }

    /// Gate low-priority tasks on this monitor.
    pub fn with_health_monitor(mut self, monitor: Arc<dyn HealthMonitor>) -> Self {
        self.health = Some(monitor);
        self
    }

    /// Register (or overwrite) a recurring task. It fires on the next tick.
    pub async fn add_task(
        &self,
        name: impl Into<String>,
        job_type: impl Into<String>,
        schedule: Schedule,
        payload: Payload,
        priority: JobPriority,
    ) -> Result<(), SchedulerError> {
        let name = name.into();
        if let Schedule::Every(interval) = &schedule
            && interval.is_zero()
        {
            return Err(SchedulerError::InvalidSchedule {
                name,
                reason: "interval must be non-zero".to_string(),
            });
        }
        if schedule.next_after(Utc::now()).is_none() {
            return Err(SchedulerError::InvalidSchedule {
                name,
                reason: format!("{schedule} never fires again"),
            });
        }

        let task = RecurringTask::new(name.clone(), job_type, schedule, payload, priority);
        info!(
            task = %name,
            job_type = %task.job_type,
            schedule = %task.schedule,
            priority = %priority,
            "Registered recurring task"
        );
        self.tasks.write().await.insert(name, task);
        Ok(())
    }

    pub async fn remove_task(&self, name: &str) -> bool {
        self.tasks.write().await.remove(name).is_some()
    }

    /// Enable or disable a task. Returns `false` if no such task exists.
    pub async fn set_enabled(&self, name: &str, enabled: bool) -> bool {
        match self.tasks.write().await.get_mut(name) {
            Some(task) => {
                task.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub async fn get_task(&self, name: &str) -> Option<RecurringTask> {
        self.tasks.read().await.get(name).cloned()
    }

    /// Snapshot of all tasks, sorted by name.
    pub async fn tasks(&self) -> Vec<RecurringTask> {
        let mut tasks: Vec<RecurringTask> = self.tasks.read().await.values().cloned().collect();
        tasks.sort_by(|a, b| a.name.cmp(&b.name));
        tasks
    }

    /// Spawn the tick loop. A second call is a no-op.
    pub async fn start(self: &Arc<Self>) {
        let mut ticker = self.ticker.lock().await;
        if ticker.is_some() {
            warn!("Background scheduler already running");
            return;
        }

        let scheduler = Arc::clone(self);
        let period = self.config.tick_interval;
        *ticker = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                scheduler.run_due_tasks(Utc::now()).await;
            }
        }));
        info!(tick = ?period, "Background scheduler started");
    }

    /// Cancel the tick loop and wait for it to finish.
    pub async fn stop(&self) {
        let Some(handle) = self.ticker.lock().await.take() else {
            debug!("Background scheduler not running");
            return;
        };
        handle.abort();
        let _ = handle.await;
        info!("Background scheduler stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.ticker.lock().await.is_some()
    }

    /// Run one tick: trigger every task due at `now`. Returns the number of
    /// jobs submitted.
    pub async fn run_due_tasks(&self, now: DateTime<Utc>) -> usize {
        let due: Vec<RecurringTask> = self
            .tasks
            .read()
            .await
            .values()
            .filter(|task| task.is_due(now))
            .cloned()
            .collect();

        let mut submitted = 0;
        for task in due {
            if self.trigger(&task).await {
                submitted += 1;
            }
            if let Some(stored) = self.tasks.write().await.get_mut(&task.name) {
                stored.advance(now);
            }
        }
        submitted
    }

    async fn trigger(&self, task: &RecurringTask) -> bool {
        if task.priority == JobPriority::Low
            && let Some(health) = &self.health
        {
            let report = health.check_health().await;
            if report.is_degraded() {
                info!(task = %task.name, "Skipping low-priority task: system degraded");
                return false;
            }
        }

        let request = JobRequest::new(task.job_type.clone(), task.payload.clone())
            .with_priority(task.priority);
        match self.processor.submit_job(request).await {
            Ok(job_id) => {
                debug!(task = %task.name, job_id = %job_id, "Recurring task submitted");
                true
            }
            Err(e) => {
                error!(task = %task.name, error = %e, "Failed to submit recurring task");
                false
            }
        }
    }
}

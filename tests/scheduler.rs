//! Integration tests for the background scheduler's health gating.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::time::timeout;

use memtask::config::{ProcessorConfig, SchedulerConfig};
use memtask::error::SchedulerError;
use memtask::jobs::{JobPriority, JobProcessor, Payload, handler_fn};
use memtask::scheduler::{
    BackgroundScheduler, ComponentHealth, HealthMonitor, HealthReport, Schedule,
};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Health monitor whose status is flipped by the test.
#[derive(Default)]
struct StubHealth {
    degraded: AtomicBool,
}

#[async_trait]
impl HealthMonitor for StubHealth {
    async fn check_health(&self) -> HealthReport {
        let component = if self.degraded.load(Ordering::SeqCst) {
            ComponentHealth::degraded("stub says so")
        } else {
            ComponentHealth::healthy()
        };
        HealthReport::from_components(HashMap::from([("stub".to_string(), component)]))
    }
}

async fn setup() -> (Arc<JobProcessor>, Arc<StubHealth>, BackgroundScheduler) {
    let processor = Arc::new(JobProcessor::in_memory(ProcessorConfig::default()));
    processor
        .register_handler("maintenance", handler_fn(|_, _| async { Ok(Value::Null) }))
        .await;
    let health = Arc::new(StubHealth::default());
    let scheduler = BackgroundScheduler::new(SchedulerConfig::default(), Arc::clone(&processor))
        .with_health_monitor(Arc::clone(&health) as Arc<dyn HealthMonitor>);
    (processor, health, scheduler)
}

fn every_minute() -> Schedule {
    Schedule::every(Duration::from_secs(60)).unwrap()
}

#[tokio::test]
async fn low_priority_skipped_while_degraded() {
    let (processor, health, scheduler) = setup().await;
    health.degraded.store(true, Ordering::SeqCst);
    scheduler
        .add_task("decay", "maintenance", every_minute(), Payload::new(), JobPriority::Low)
        .await
        .unwrap();

    let now = Utc::now() + chrono::Duration::seconds(1);
    assert_eq!(scheduler.run_due_tasks(now).await, 0);
    assert_eq!(processor.get_metrics().await.total_jobs, 0);

    // A skipped firing still counts as a run.
    let task = scheduler.get_task("decay").await.unwrap();
    assert_eq!(task.last_run, Some(now));
    assert_eq!(task.next_run, Some(now + chrono::Duration::seconds(60)));
}

#[tokio::test]
async fn high_priority_runs_while_degraded() {
    let (processor, health, scheduler) = setup().await;
    health.degraded.store(true, Ordering::SeqCst);
    scheduler
        .add_task("consolidate", "maintenance", every_minute(), Payload::new(), JobPriority::High)
        .await
        .unwrap();

    assert_eq!(
        scheduler
            .run_due_tasks(Utc::now() + chrono::Duration::seconds(1))
            .await,
        1
    );
    let metrics = processor.get_metrics().await;
    assert_eq!(metrics.total_jobs, 1);
    assert_eq!(metrics.jobs_by_priority[&JobPriority::High], 1);
}

#[tokio::test]
async fn low_priority_resumes_when_healthy() {
    let (processor, health, scheduler) = setup().await;
    health.degraded.store(true, Ordering::SeqCst);
    scheduler
        .add_task("decay", "maintenance", every_minute(), Payload::new(), JobPriority::Low)
        .await
        .unwrap();

    let first = Utc::now() + chrono::Duration::seconds(1);
    assert_eq!(scheduler.run_due_tasks(first).await, 0);

    health.degraded.store(false, Ordering::SeqCst);
    let next = first + chrono::Duration::seconds(60);
    assert_eq!(scheduler.run_due_tasks(next).await, 1);
    assert_eq!(processor.get_metrics().await.total_jobs, 1);
}

#[tokio::test]
async fn tick_loop_submits_new_task_immediately() {
    let processor = Arc::new(JobProcessor::in_memory(ProcessorConfig::default()));
    processor
        .register_handler("maintenance", handler_fn(|_, _| async { Ok(Value::Null) }))
        .await;
    let scheduler = Arc::new(BackgroundScheduler::new(
        SchedulerConfig {
            tick_interval: Duration::from_millis(10),
        },
        Arc::clone(&processor),
    ));
    scheduler
        .add_task("sweep", "maintenance", every_minute(), Payload::new(), JobPriority::Medium)
        .await
        .unwrap();

    scheduler.start().await;
    timeout(TEST_TIMEOUT, async {
        while processor.get_metrics().await.total_jobs == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("scheduler never submitted the task");
    scheduler.stop().await;

    // Further ticks within the interval do not resubmit.
    assert_eq!(processor.get_metrics().await.total_jobs, 1);
}

#[tokio::test]
async fn cron_task_is_validated_and_scheduled() {
    let (_processor, _health, scheduler) = setup().await;
    assert!(matches!(
        Schedule::cron("61 * * * * *"),
        Err(SchedulerError::MalformedSchedule { expression, .. }) if expression == "61 * * * * *"
    ));

    // A cron pinned to a past year has no future firing.
    let err = scheduler
        .add_task(
            "y2k",
            "maintenance",
            Schedule::cron("0 0 0 1 1 * 2000").unwrap(),
            Payload::new(),
            JobPriority::Medium,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidSchedule { name, .. } if name == "y2k"));
    assert!(scheduler.get_task("y2k").await.is_none());

    scheduler
        .add_task(
            "nightly",
            "maintenance",
            Schedule::cron("0 0 3 * * *").unwrap(),
            Payload::new(),
            JobPriority::Medium,
        )
        .await
        .unwrap();

    let now = Utc::now() + chrono::Duration::seconds(1);
    assert_eq!(scheduler.run_due_tasks(now).await, 1);
    let next = scheduler.get_task("nightly").await.unwrap().next_run.unwrap();
    assert!(next > now);
}

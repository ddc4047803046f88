use std::sync::Arc;
use std::time::Duration;

use memtask::cognition::{
    CognitiveEngine, EventInput, EventOutcome, RetriggerPolicy, TracingAuditSink, make_event_fn,
};
use memtask::config::{EngineConfig, ProcessorConfig, SchedulerConfig};
use memtask::jobs::{JobPriority, JobProcessor, Payload, handler_fn};
use memtask::scheduler::{BackgroundScheduler, LoadMonitor, Schedule};

/// Pending jobs above which low-priority maintenance is skipped.
const BACKPRESSURE_THRESHOLD: usize = 100;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let processor_config = ProcessorConfig::from_env();
    let scheduler_config = SchedulerConfig::from_env();
    let engine_config = EngineConfig::from_env();
    processor_config.validate()?;
    scheduler_config.validate()?;
    engine_config.validate()?;

    eprintln!("memtask v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Workers: {}", processor_config.worker_count);
    eprintln!("   Scheduler tick: {:?}", scheduler_config.tick_interval);

    // ── Job processor ────────────────────────────────────────────────────
    let processor = Arc::new(JobProcessor::in_memory(processor_config));
    processor
        .register_handler(
            "heartbeat",
            handler_fn(|payload: Payload, _| async move {
                tracing::info!(?payload, "Heartbeat");
                Ok(serde_json::json!({ "ok": true }))
            }),
        )
        .await;
    processor.start().await;

    // ── Scheduler ────────────────────────────────────────────────────────
    let monitor = Arc::new(LoadMonitor::new(
        Arc::clone(&processor),
        BACKPRESSURE_THRESHOLD,
    ));
    let scheduler = Arc::new(
        BackgroundScheduler::new(scheduler_config, Arc::clone(&processor))
            .with_health_monitor(monitor),
    );
    scheduler
        .add_task(
            "heartbeat",
            "heartbeat",
            Schedule::every(Duration::from_secs(300))?,
            Payload::new(),
            JobPriority::Low,
        )
        .await?;
    scheduler.start().await;

    // ── Cognitive engine ─────────────────────────────────────────────────
    let engine = CognitiveEngine::new(engine_config).with_audit_sink(Arc::new(TracingAuditSink));
    let recall = engine
        .make_event(make_event_fn("recall", |_, _| async {
            Ok(EventOutcome::Value(serde_json::json!(["startup"])))
        }))
        .await;
    engine
        .listen_group(
            make_event_fn("summarize", |input: Option<EventInput>, _| async move {
                let recalled = input.map(|i| i.results.len()).unwrap_or_default();
                Ok(EventOutcome::Value(serde_json::json!({ "recalled": recalled })))
            }),
            &[&recall],
            Some("recall"),
            RetriggerPolicy::All,
        )
        .await?;
    let run = engine.invoke_event(&recall.id, None, None, None).await?;
    eprintln!("   Engine: self-check ran {} events", run.len());

    eprintln!("   Press Ctrl-C to stop.\n");
    tokio::signal::ctrl_c().await?;

    scheduler.stop().await;
    processor.stop().await;
    Ok(())
}

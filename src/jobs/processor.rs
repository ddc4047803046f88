//! Job processor: priority queue, worker pool, retries.
//!
//! Jobs are persisted as hash records and their ids pushed onto a scored
//! queue. Workers pop the lowest score, so the score encodes both priority
//! (dominant) and submission order (FIFO tie-break). Failed attempts are
//! re-enqueued by a deferred timer task after their backoff, never by a
//! sleeping worker.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::FutureExt;
use tokio::sync::{Mutex, Notify, RwLock, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::ProcessorConfig;
use crate::error::{JobError, StoreError};
use crate::jobs::handler::{HandlerRegistry, JobDeps, JobHandler};
use crate::jobs::metrics::{JobMetrics, QueueStats};
use crate::jobs::model::{Job, JobPriority, JobRequest, JobResult, JobStatus};
use crate::jobs::retry::RetryPolicy;
use crate::jobs::store::{InMemoryQueueStore, QueueStore};

/// Queue key holding pending job ids.
pub const QUEUE_KEY: &str = "job_queue";

/// Priority weight multiplier. Must exceed any realistic submission count.
const PRIORITY_SCALE: i64 = 1_000_000_000_000;

/// Lower score pops first: higher weight subtracts more, earlier sequence adds less.
pub fn queue_score(priority: JobPriority, sequence: u64) -> i64 {
    sequence as i64 - priority.weight() * PRIORITY_SCALE
}

/// Run a store call against the primary store, falling back to the local
/// in-memory store once the primary reports itself unavailable.
macro_rules! with_fallback {
    ($inner:expr, $store:ident => $call:expr) => {{
        let mut primary_result = None;
        if let Some($store) = $inner.primary() {
            match $call.await {
                Err(e) if e.is_unavailable() => $inner.fall_back(&e),
                other => primary_result = Some(other),
            }
        }
        match primary_result {
            Some(result) => result,
            None => {
                let $store: Arc<dyn QueueStore> = $inner.local.clone();
                $call.await
            }
        }
    }};
}

struct Inner {
    config: ProcessorConfig,
    retry: RetryPolicy,
    primary: Option<Arc<dyn QueueStore>>,
    local: Arc<InMemoryQueueStore>,
    degraded: AtomicBool,
    handlers: HandlerRegistry,
    deps: JobDeps,
    metrics: RwLock<JobMetrics>,
    sequence: AtomicU64,
    busy: AtomicUsize,
    pool_size: AtomicUsize,
    work_available: Notify,
    /// Held across every load-transition-save of a job record.
    status_lock: Mutex<()>,
}

struct WorkerPool {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

/// Owns job lifecycle, the worker pool, and the handler registry.
pub struct JobProcessor {
    inner: Arc<Inner>,
    pool: Mutex<Option<WorkerPool>>,
}

impl JobProcessor {
    /// Create a processor. `store` is the durable queue; `None` runs purely in memory.
    pub fn new(config: ProcessorConfig, store: Option<Arc<dyn QueueStore>>, deps: JobDeps) -> Self {
        Self {
            inner: Arc::new(Inner {
                retry: RetryPolicy::from_config(&config),
                config,
                primary: store,
                local: InMemoryQueueStore::new(),
                degraded: AtomicBool::new(false),
                handlers: HandlerRegistry::new(),
                deps,
                metrics: RwLock::new(JobMetrics::default()),
                sequence: AtomicU64::new(0),
                busy: AtomicUsize::new(0),
                pool_size: AtomicUsize::new(0),
                work_available: Notify::new(),
                status_lock: Mutex::new(()),
            }),
            pool: Mutex::new(None),
        }
    }

    /// Create a processor backed only by the in-memory store.
    pub fn in_memory(config: ProcessorConfig) -> Self {
        Self::new(config, None, JobDeps::new())
    }

    /// Register the handler for a job type.
    pub async fn register_handler(
        &self,
        job_type: impl Into<String>,
        handler: Arc<dyn JobHandler>,
    ) {
        self.inner.handlers.register(job_type, handler).await;
    }

    pub async fn registered_job_types(&self) -> Vec<String> {
        self.inner.handlers.list().await
    }

    /// Persist and enqueue a job. Returns its id.
    pub async fn submit_job(&self, request: JobRequest) -> Result<Uuid, JobError> {
        if !self.inner.handlers.has(&request.job_type).await {
            return Err(JobError::UnknownJobType {
                job_type: request.job_type,
            });
        }

        let max_retries = request
            .max_retries
            .unwrap_or(self.inner.config.default_max_retries);
        let timeout = request.timeout.unwrap_or(self.inner.config.default_timeout);
        let job = Job::new(request, max_retries, timeout);

        self.inner.save_job(&job).await?;
        self.inner
            .metrics
            .write()
            .await
            .record_submission(job.priority);

        let delay = job
            .scheduled_at
            .and_then(|at| (at - Utc::now()).to_std().ok())
            .filter(|d| !d.is_zero());

        match delay {
            Some(delay) => {
                debug!(job_id = %job.id, ?delay, "Deferring scheduled job");
                Inner::release_after(&self.inner, job.id, delay);
            }
            None => self.inner.enqueue(job.id, job.priority).await?,
        }

        info!(
            job_id = %job.id,
            job_type = %job.job_type,
            priority = %job.priority,
            "Job submitted"
        );
        Ok(job.id)
    }

    pub async fn get_job_status(&self, job_id: Uuid) -> Result<Option<Job>, JobError> {
        Ok(self.inner.load_job(job_id).await?)
    }

    pub async fn get_job_result(&self, job_id: Uuid) -> Result<Option<JobResult>, JobError> {
        let key = JobResult::record_key(job_id);
        let fields = with_fallback!(self.inner, store => store.hash_get_all(&key))?;
        Ok(fields.map(|f| JobResult::from_fields(&f)).transpose()?)
    }

    /// Cancel a job that has not started. Returns `false` if it is already
    /// running or finished.
    pub async fn cancel_job(&self, job_id: Uuid) -> Result<bool, JobError> {
        let _status = self.inner.status_lock.lock().await;
        let mut job = self
            .inner
            .load_job(job_id)
            .await?
            .ok_or(JobError::NotFound { id: job_id })?;

        if job.transition_to(JobStatus::Cancelled).is_err() {
            debug!(job_id = %job_id, status = %job.status, "Job not cancellable");
            return Ok(false);
        }
        self.inner.save_job(&job).await?;
        info!(job_id = %job_id, "Job cancelled");
        Ok(true)
    }

    /// Spawn the worker pool. A second call is a no-op.
    pub async fn start(&self) {
        let mut pool = self.pool.lock().await;
        if pool.is_some() {
            warn!("Job processor already running");
            return;
        }

        let worker_count = self.inner.config.worker_count;
        let (shutdown, rx) = watch::channel(false);
        let mut handles: Vec<JoinHandle<()>> = (0..worker_count)
            .map(|i| {
                tokio::spawn(worker_loop(
                    Arc::clone(&self.inner),
                    format!("worker-{i}"),
                    rx.clone(),
                ))
            })
            .collect();
        handles.push(tokio::spawn(purge_loop(Arc::clone(&self.inner), rx)));

        self.inner.pool_size.store(worker_count, Ordering::SeqCst);
        *pool = Some(WorkerPool { shutdown, handles });
        info!(workers = worker_count, "Job processor started");
    }

    /// Signal workers to stop and wait for them. Workers still busy after the
    /// shutdown grace period are aborted; their job records stay `running`.
    pub async fn stop(&self) {
        let Some(pool) = self.pool.lock().await.take() else {
            debug!("Job processor not running");
            return;
        };

        let _ = pool.shutdown.send(true);
        let deadline = tokio::time::Instant::now() + self.inner.config.shutdown_grace;
        for mut handle in pool.handles {
            if tokio::time::timeout_at(deadline, &mut handle).await.is_err() {
                warn!("Worker did not stop within grace period, aborting");
                handle.abort();
                let _ = handle.await;
            }
        }

        self.inner.pool_size.store(0, Ordering::SeqCst);
        info!("Job processor stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.pool.lock().await.is_some()
    }

    /// Snapshot of aggregate metrics.
    pub async fn get_metrics(&self) -> JobMetrics {
        let mut metrics = self.inner.metrics.read().await.clone();
        let pool = self.inner.pool_size.load(Ordering::SeqCst);
        let busy = self.inner.busy.load(Ordering::SeqCst);
        metrics.worker_utilization = if pool == 0 {
            0.0
        } else {
            busy as f64 / pool as f64
        };
        metrics
    }

    pub async fn get_queue_stats(&self) -> Result<QueueStats, JobError> {
        let pending = with_fallback!(self.inner, store => store.queue_len(QUEUE_KEY))?;
        let busy = self.inner.busy.load(Ordering::SeqCst);
        Ok(QueueStats {
            pending,
            running: busy,
            workers: self.inner.pool_size.load(Ordering::SeqCst),
            busy_workers: busy,
            degraded: self.is_degraded(),
        })
    }

    /// True once the primary store failed and the local queue took over.
    pub fn is_degraded(&self) -> bool {
        self.inner.degraded.load(Ordering::SeqCst)
    }
}

impl Inner {
    fn primary(&self) -> Option<Arc<dyn QueueStore>> {
        if self.degraded.load(Ordering::SeqCst) {
            None
        } else {
            self.primary.clone()
        }
    }

    fn fall_back(&self, err: &StoreError) {
        if !self.degraded.swap(true, Ordering::SeqCst) {
            warn!(error = %err, "Queue store unavailable, falling back to in-memory queue");
        }
    }

    async fn save_job(&self, job: &Job) -> Result<(), StoreError> {
        let key = Job::record_key(job.id);
        let fields = job.to_fields();
        with_fallback!(self, store => store.hash_set(&key, fields.clone()))?;
        with_fallback!(self, store => store.expire(&key, self.config.record_ttl))
    }

    async fn load_job(&self, job_id: Uuid) -> Result<Option<Job>, StoreError> {
        let key = Job::record_key(job_id);
        let fields = with_fallback!(self, store => store.hash_get_all(&key))?;
        fields.map(|f| Job::from_fields(&f)).transpose()
    }

    async fn save_result(&self, result: &JobResult) -> Result<(), StoreError> {
        let key = JobResult::record_key(result.job_id);
        let fields = result.to_fields();
        with_fallback!(self, store => store.hash_set(&key, fields.clone()))?;
        with_fallback!(self, store => store.expire(&key, self.config.record_ttl))
    }

    async fn enqueue(&self, job_id: Uuid, priority: JobPriority) -> Result<(), StoreError> {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let member = job_id.to_string();
        let score = queue_score(priority, sequence);
        with_fallback!(self, store => store.push(QUEUE_KEY, &member, score))?;
        self.work_available.notify_one();
        Ok(())
    }

    /// Enqueue a deferred job once `delay` has elapsed.
    fn release_after(inner: &Arc<Inner>, job_id: Uuid, delay: Duration) {
        let inner = Arc::clone(inner);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = inner.release(job_id).await {
                error!(job_id = %job_id, error = %e, "Failed to re-enqueue job");
            }
        });
    }

    async fn release(&self, job_id: Uuid) -> Result<(), StoreError> {
        let status = self.status_lock.lock().await;
        let Some(mut job) = self.load_job(job_id).await? else {
            warn!(job_id = %job_id, "Deferred job record expired before release");
            return Ok(());
        };

        match job.status {
            JobStatus::Retrying => {
                if let Err(e) = job.transition_to(JobStatus::Pending) {
                    warn!(job_id = %job_id, "{e}");
                    return Ok(());
                }
                self.save_job(&job).await?;
            }
            JobStatus::Pending => {}
            other => {
                debug!(job_id = %job_id, status = %other, "Skipping release of job");
                return Ok(());
            }
        }
        drop(status);

        self.enqueue(job.id, job.priority).await
    }

    /// Pop the next runnable job and mark it running for `worker_id`,
    /// skipping stale queue entries.
    async fn next_job(&self, worker_id: &str) -> Result<Option<Job>, StoreError> {
        loop {
            let Some(member) = with_fallback!(self, store => store.pop_min(QUEUE_KEY))? else {
                return Ok(None);
            };

            let Ok(job_id) = member.parse::<Uuid>() else {
                warn!(member = %member, "Dropping malformed queue entry");
                continue;
            };

            if let Some(job) = self.claim(job_id, worker_id).await {
                return Ok(Some(job));
            }
        }
    }

    /// Move a popped job from pending to running. `None` if it was cancelled,
    /// expired or unreadable in the meantime.
    async fn claim(&self, job_id: Uuid, worker_id: &str) -> Option<Job> {
        let _status = self.status_lock.lock().await;
        let mut job = match self.load_job(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                warn!(job_id = %job_id, "Queued job has no record");
                return None;
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Unreadable job record");
                return None;
            }
        };
        if job.transition_to(JobStatus::Running).is_err() {
            debug!(job_id = %job_id, status = %job.status, "Skipping non-pending job");
            return None;
        }
        job.worker_id = Some(worker_id.to_string());
        if let Err(e) = self.save_job(&job).await {
            error!(job_id = %job.id, error = %e, "Failed to mark job running");
        }
        Some(job)
    }

    async fn process_job(self: &Arc<Self>, job: Job, worker_id: &str) {

        debug!(job_id = %job.id, job_type = %job.job_type, worker = %worker_id, "Job started");

        let Some(handler) = self.handlers.get(&job.job_type).await else {
            let err = JobError::UnknownJobType {
                job_type: job.job_type.clone(),
            };
            error!(job_id = %job.id, "{err}");
            self.finish_failed(job, err.to_string(), Duration::ZERO).await;
            return;
        };

        let started = Instant::now();
        let outcome = self.run_handler(handler, &job).await;
        let elapsed = started.elapsed();

        match outcome {
            Ok(value) => self.finish_completed(job, value, elapsed).await,
            Err(e) => self.handle_failure(job, e, elapsed).await,
        }
    }

    async fn run_handler(
        &self,
        handler: Arc<dyn JobHandler>,
        job: &Job,
    ) -> Result<serde_json::Value, JobError> {
        let call = AssertUnwindSafe(handler.handle(job.payload.clone(), self.deps.clone()))
            .catch_unwind();

        match tokio::time::timeout(job.timeout, call).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(e))) => Err(JobError::HandlerFailed {
                id: job.id,
                reason: format!("{e:#}"),
            }),
            Ok(Err(panic)) => Err(JobError::HandlerFailed {
                id: job.id,
                reason: format!("handler panicked: {}", panic_message(&panic)),
            }),
            Err(_) => Err(JobError::TimedOut {
                id: job.id,
                timeout: job.timeout,
            }),
        }
    }

    async fn handle_failure(self: &Arc<Self>, mut job: Job, err: JobError, elapsed: Duration) {
        job.retry_count = (job.retry_count + 1).min(job.max_retries);
        let reason = err.to_string();

        if !job.can_retry() {
            let exhausted = JobError::RetryExhausted {
                id: job.id,
                attempts: job.retry_count,
                reason: reason.clone(),
            };
            error!(job_id = %job.id, job_type = %job.job_type, "{exhausted}");
            self.finish_failed(job, reason, elapsed).await;
            return;
        }

        job.error_message = Some(reason);
        if let Err(e) = job.transition_to(JobStatus::Retrying) {
            warn!(job_id = %job.id, "{e}");
            return;
        }
        if let Err(e) = self.save_job(&job).await {
            error!(job_id = %job.id, error = %e, "Failed to persist retrying job");
        }
        self.metrics.write().await.record_retry(elapsed);

        let delay = self.retry.delay_for(job.retry_count);
        warn!(
            job_id = %job.id,
            attempt = job.retry_count,
            max_retries = job.max_retries,
            ?delay,
            error = %err,
            "Job failed, scheduling retry"
        );
        Inner::release_after(self, job.id, delay);
    }

    async fn finish_completed(&self, mut job: Job, value: serde_json::Value, elapsed: Duration) {
        if let Err(e) = job.transition_to(JobStatus::Completed) {
            warn!(job_id = %job.id, "{e}");
            return;
        }
        job.error_message = None;

        let result = JobResult {
            job_id: job.id,
            success: true,
            result: value,
            execution_time: elapsed,
            error: None,
            completed_at: job.completed_at.unwrap_or_else(Utc::now),
            worker_id: job.worker_id.clone(),
        };
        self.commit(&job, &result).await;
        self.metrics.write().await.record_success(elapsed);
        info!(job_id = %job.id, job_type = %job.job_type, ?elapsed, "Job completed");
    }

    async fn finish_failed(&self, mut job: Job, reason: String, elapsed: Duration) {
        if let Err(e) = job.transition_to(JobStatus::Failed) {
            warn!(job_id = %job.id, "{e}");
            return;
        }
        job.error_message = Some(reason.clone());

        let result = JobResult {
            job_id: job.id,
            success: false,
            result: serde_json::Value::Null,
            execution_time: elapsed,
            error: Some(reason),
            completed_at: job.completed_at.unwrap_or_else(Utc::now),
            worker_id: job.worker_id.clone(),
        };
        self.commit(&job, &result).await;
        self.metrics.write().await.record_failure(elapsed);
    }

    async fn commit(&self, job: &Job, result: &JobResult) {
        if let Err(e) = self.save_job(job).await {
            error!(job_id = %job.id, error = %e, "Failed to persist terminal job state");
        }
        if let Err(e) = self.save_result(result).await {
            error!(job_id = %job.id, error = %e, "Failed to persist job result");
        }
    }
}

/// Decrements the busy-worker count even if the worker task is aborted mid-job.
struct BusyGuard<'a>(&'a AtomicUsize);

impl<'a> BusyGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn worker_loop(inner: Arc<Inner>, worker_id: String, mut shutdown: watch::Receiver<bool>) {
    debug!(worker = %worker_id, "Worker started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        match inner.next_job(&worker_id).await {
            Ok(Some(job)) => {
                let _busy = BusyGuard::enter(&inner.busy);
                inner.process_job(job, &worker_id).await;
            }
            Ok(None) => {
                tokio::select! {
                    _ = inner.work_available.notified() => {}
                    _ = tokio::time::sleep(inner.config.idle_poll_interval) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                error!(worker = %worker_id, error = %e, "Failed to dequeue job");
                tokio::time::sleep(inner.config.idle_poll_interval).await;
            }
        }
    }

    debug!(worker = %worker_id, "Worker stopped");
}

/// Periodically free expired records from the local store.
async fn purge_loop(inner: Arc<Inner>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(inner.config.purge_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                inner.local.purge_expired().await;
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

fn panic_message(panic: &Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::handler::handler_fn;
    use crate::jobs::model::Payload;

    fn test_config() -> ProcessorConfig {
        ProcessorConfig {
            worker_count: 1,
            idle_poll_interval: Duration::from_millis(10),
            retry_base_delay: Duration::from_millis(5),
            retry_max_delay: Duration::from_millis(20),
            ..Default::default()
        }
    }

    #[test]
    fn score_orders_priority_then_fifo() {
        let low_first = queue_score(JobPriority::Low, 0);
        let high_later = queue_score(JobPriority::High, 1);
        let high_latest = queue_score(JobPriority::High, 2);
        assert!(high_later < low_first);
        assert!(high_later < high_latest);
        assert!(queue_score(JobPriority::Critical, 99) < queue_score(JobPriority::High, 0));
    }

    #[tokio::test]
    async fn submit_unknown_type_fails() {
        let processor = JobProcessor::in_memory(test_config());
        let err = processor
            .submit_job(JobRequest::new("nope", Payload::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::UnknownJobType { job_type } if job_type == "nope"));
    }

    #[tokio::test]
    async fn submit_persists_pending_job() {
        let processor = JobProcessor::in_memory(test_config());
        processor
            .register_handler("noop", handler_fn(|_, _| async { Ok(serde_json::Value::Null) }))
            .await;

        let id = processor
            .submit_job(JobRequest::new("noop", Payload::new()).with_priority(JobPriority::High))
            .await
            .unwrap();

        let job = processor.get_job_status(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.max_retries, 3);
        assert_eq!(job.timeout, Duration::from_secs(300));
        assert!(processor.get_job_result(id).await.unwrap().is_none());

        let stats = processor.get_queue_stats().await.unwrap();
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.workers, 0);
        assert!(!stats.degraded);

        let metrics = processor.get_metrics().await;
        assert_eq!(metrics.total_jobs, 1);
        assert_eq!(metrics.jobs_by_priority[&JobPriority::High], 1);
    }

    #[tokio::test]
    async fn status_of_unknown_job_is_none() {
        let processor = JobProcessor::in_memory(test_config());
        assert!(processor.get_job_status(Uuid::new_v4()).await.unwrap().is_none());
        assert!(matches!(
            processor.cancel_job(Uuid::new_v4()).await,
            Err(JobError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn start_twice_and_stop_before_start() {
        let processor = JobProcessor::in_memory(test_config());
        processor.stop().await;
        assert!(!processor.is_running().await);

        processor.start().await;
        processor.start().await;
        assert!(processor.is_running().await);
        assert_eq!(processor.get_queue_stats().await.unwrap().workers, 1);

        processor.stop().await;
        assert!(!processor.is_running().await);
        assert_eq!(processor.get_queue_stats().await.unwrap().workers, 0);
    }

    #[tokio::test]
    async fn cancelled_job_is_never_run() {
        let processor = JobProcessor::in_memory(test_config());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        processor
            .register_handler(
                "count",
                handler_fn(move |_, _| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Ok(serde_json::Value::Null) }
                }),
            )
            .await;

        let id = processor
            .submit_job(JobRequest::new("count", Payload::new()))
            .await
            .unwrap();
        assert!(processor.cancel_job(id).await.unwrap());
        assert!(!processor.cancel_job(id).await.unwrap());

        processor.start().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        processor.stop().await;

        let job = processor.get_job_status(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(processor.get_queue_stats().await.unwrap().pending, 0);
    }

    #[tokio::test]
    async fn expired_records_are_swept_while_running() {
        let processor = JobProcessor::in_memory(ProcessorConfig {
            record_ttl: Duration::from_millis(20),
            purge_interval: Duration::from_millis(10),
            ..test_config()
        });
        processor
            .register_handler("noop", handler_fn(|_, _| async { Ok(serde_json::Value::Null) }))
            .await;

        processor.start().await;
        let id = processor
            .submit_job(JobRequest::new("noop", Payload::new()))
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while processor.inner.local.record_count().await > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("expired records were never reclaimed");
        processor.stop().await;

        assert!(processor.get_job_status(id).await.unwrap().is_none());
    }

    #[test]
    fn panic_messages() {
        let boxed: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(panic_message(&boxed), "static str");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(&boxed), "owned");
        let boxed: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(&boxed), "unknown panic");
    }
}

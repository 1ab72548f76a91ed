// Worker - Job execution loop

pub mod constants;
mod panic_guard;
mod pool;
mod shutdown;

use constants::*;
pub use panic_guard::{describe_join_error, panic_message};
pub use pool::{PoolState, WorkerPool};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::application::middleware::JobContext;
use crate::application::registry::Dispatcher;
use crate::application::retry::{RetryDecision, RetryPolicy};
use crate::config::QueueConfig;
use crate::domain::JobRecord;
use crate::error::{AppError, Result};
use crate::port::QueueStore;
use rand::Rng;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Observable state of one worker unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    Idle = 0,
    Claiming = 1,
    Executing = 2,
    /// Recording success or failure in the store
    Resolving = 3,
    Stopped = 4,
}

impl WorkerState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => WorkerState::Idle,
            1 => WorkerState::Claiming,
            2 => WorkerState::Executing,
            3 => WorkerState::Resolving,
            _ => WorkerState::Stopped,
        }
    }
}

/// Shared, lock-free view of a unit's state
#[derive(Debug, Clone)]
pub struct WorkerStateCell(Arc<AtomicU8>);

impl WorkerStateCell {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU8::new(WorkerState::Idle as u8)))
    }

    pub fn get(&self) -> WorkerState {
        WorkerState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, state: WorkerState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

impl Default for WorkerStateCell {
    fn default() -> Self {
        Self::new()
    }
}

/// One worker unit: claim -> execute through the chain -> resolve
pub struct Worker {
    worker_id: String,
    store: Arc<dyn QueueStore>,
    dispatcher: Arc<Dispatcher>,
    retry_policy: Arc<RetryPolicy>,
    config: Arc<QueueConfig>,
    state: WorkerStateCell,
}

impl Worker {
    pub fn new(
        worker_id: impl Into<String>,
        store: Arc<dyn QueueStore>,
        dispatcher: Arc<Dispatcher>,
        retry_policy: Arc<RetryPolicy>,
        config: Arc<QueueConfig>,
    ) -> Self {
        Self {
            worker_id: worker_id.into(),
            store,
            dispatcher,
            retry_policy,
            config,
            state: WorkerStateCell::new(),
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn state_cell(&self) -> WorkerStateCell {
        self.state.clone()
    }

    /// Run worker loop until shutdown is signalled.
    ///
    /// Shutdown is only observed between jobs: an execution in progress is
    /// always resolved first.
    pub async fn run(&self, mut shutdown: ShutdownToken) {
        info!(worker_id = %self.worker_id, namespace = %self.store.namespace(), "Worker started");
        loop {
            if shutdown.is_shutdown() {
                info!(worker_id = %self.worker_id, "Worker shutting down");
                break;
            }
            match self.process_next_job().await {
                Ok(true) => {}
                Ok(false) => {
                    tokio::select! {
                        _ = sleep(self.idle_sleep()) => {},
                        _ = shutdown.wait() => {
                            debug!(worker_id = %self.worker_id, "Worker interrupted during idle");
                            break;
                        }
                    }
                }
                Err(e) => {
                    error!(worker_id = %self.worker_id, error = %e, "Worker store error, backing off");
                    tokio::select! {
                        _ = sleep(self.config.error_backoff) => {},
                        _ = shutdown.wait() => {
                            debug!(worker_id = %self.worker_id, "Worker interrupted during error backoff");
                            break;
                        }
                    }
                }
            }
        }
        self.state.set(WorkerState::Stopped);
        info!(worker_id = %self.worker_id, "Worker stopped");
    }

    /// Claim and fully process one job. `Ok(false)` when nothing was ready.
    ///
    /// Errors are store failures only; handler failures are absorbed into
    /// requeue / dead-letter.
    pub async fn process_next_job(&self) -> Result<bool> {
        self.state.set(WorkerState::Claiming);
        let claimed = self
            .store
            .claim_next(&self.worker_id, self.config.lease_timeout_ms())
            .await;

        let record = match claimed {
            Ok(Some(record)) => record,
            Ok(None) => {
                self.state.set(WorkerState::Idle);
                return Ok(false);
            }
            Err(e) => {
                self.state.set(WorkerState::Idle);
                return Err(e);
            }
        };

        self.state.set(WorkerState::Executing);
        let (outcome, max_fails) = self.execute(&record).await;

        self.state.set(WorkerState::Resolving);
        let resolved = self.resolve(&record, outcome, max_fails).await;
        self.state.set(WorkerState::Idle);
        resolved.map(|_| true)
    }

    /// Run the compiled chain for `record` on its own task, heartbeating the
    /// lease until it finishes. Returns the outcome and the `max_fails` that
    /// applies to this job.
    async fn execute(&self, record: &JobRecord) -> (Result<()>, u32) {
        let job = match self.dispatcher.resolve(&record.name) {
            Ok(job) => job,
            Err(e) => return (Err(e), record.max_fails),
        };
        // The record carries the ceiling stamped at enqueue time
        let max_fails = if record.max_fails > 0 {
            record.max_fails
        } else {
            job.options.max_fails
        };

        if let Err(e) = record.validate_args(&job.options.schema) {
            return (Err(e), max_fails);
        }

        let ctx = JobContext::new(
            self.worker_id.clone(),
            self.store.namespace(),
            record.attempt(),
        );
        let mut handle = tokio::spawn((job.chain)(record.clone(), ctx));

        let lease_ms = self.config.lease_timeout_ms();
        let mut heartbeat = tokio::time::interval(self.renew_interval());
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick completes immediately
        heartbeat.tick().await;

        let joined = loop {
            tokio::select! {
                joined = &mut handle => break joined,
                _ = heartbeat.tick() => {
                    match self.store.renew_lease(&record.id, &self.worker_id, lease_ms).await {
                        Ok(true) => {}
                        Ok(false) => warn!(
                            job_id = %record.id,
                            worker_id = %self.worker_id,
                            "Lease lost while executing; job may run again elsewhere"
                        ),
                        Err(e) => warn!(
                            job_id = %record.id,
                            worker_id = %self.worker_id,
                            error = %e,
                            "Lease renewal failed"
                        ),
                    }
                }
            }
        };

        let outcome = match joined {
            Ok(result) => result,
            Err(join_err) => Err(AppError::HandlerFailure(describe_join_error(
                &record.id, join_err,
            ))),
        };
        (outcome, max_fails)
    }

    async fn resolve(&self, record: &JobRecord, outcome: Result<()>, max_fails: u32) -> Result<()> {
        let error = match outcome {
            Ok(()) => {
                if self.store.ack(&record.id, &self.worker_id).await? {
                    debug!(job_id = %record.id, job_name = %record.name, "Job acked");
                } else {
                    warn!(
                        job_id = %record.id,
                        worker_id = %self.worker_id,
                        "Claim lost before ack; job will run again"
                    );
                }
                return Ok(());
            }
            Err(e) => e,
        };

        let message = error.to_string();
        let owned = match self.retry_policy.decide(record, max_fails, &error) {
            RetryDecision::Retry(delay_ms) => {
                self.store
                    .requeue(record, &self.worker_id, delay_ms, &message)
                    .await?
            }
            RetryDecision::Dead => {
                let killed = self.store.kill(record, &self.worker_id, &message).await?;
                if killed {
                    error!(
                        job_id = %record.id,
                        job_name = %record.name,
                        fail_count = record.fail_count + 1,
                        error = %message,
                        "Job moved to dead-letter"
                    );
                }
                killed
            }
        };

        if !owned {
            warn!(
                job_id = %record.id,
                worker_id = %self.worker_id,
                "Claim lost before failure was recorded"
            );
        }
        Ok(())
    }

    fn renew_interval(&self) -> Duration {
        (self.config.lease_timeout / LEASE_RENEWALS_PER_TIMEOUT).max(MIN_LEASE_RENEW_INTERVAL)
    }

    /// `poll_interval` with uniform jitter so idle units don't poll in lockstep
    fn idle_sleep(&self) -> Duration {
        let base = self.config.poll_interval.as_secs_f64();
        let spread = base * IDLE_JITTER_RATIO;
        let secs = rand::thread_rng().gen_range((base - spread)..=(base + spread));
        Duration::from_secs_f64(secs.max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::middleware::{Middleware, TimingMiddleware};
    use crate::application::registry::{JobOptions, JobRegistry};
    use crate::domain::{ArgSchema, JobArgs, JobState, QueueStats};
    use crate::port::time_provider::mocks::ManualTimeProvider;
    use crate::port::InMemoryQueueStore;
    use std::sync::atomic::AtomicUsize;

    const NOW: i64 = 1_000_000;

    struct Harness {
        store: Arc<InMemoryQueueStore>,
        time: Arc<ManualTimeProvider>,
        worker: Worker,
    }

    fn harness(registry: JobRegistry) -> Harness {
        let time = Arc::new(ManualTimeProvider::new(NOW));
        let store = Arc::new(InMemoryQueueStore::new("test", time.clone(), 100));
        let mut config = QueueConfig::new("test");
        config.base_backoff = Duration::from_millis(100);
        config.max_backoff = Duration::from_secs(10);
        let config = Arc::new(config);

        let dispatcher = Arc::new(registry.compile(&[Arc::new(TimingMiddleware) as Arc<dyn Middleware>]));
        let worker = Worker::new(
            "worker-0",
            store.clone(),
            dispatcher,
            Arc::new(RetryPolicy::from_config(&config)),
            config,
        );
        Harness { store, time, worker }
    }

    async fn push(store: &InMemoryQueueStore, name: &str, args: JobArgs, max_fails: u32) -> String {
        let record = JobRecord::new(format!("{}-job", name), NOW, "test", name, args, max_fails);
        store.push(&record).await.unwrap();
        record.id
    }

    #[tokio::test]
    async fn test_success_acks_and_removes() {
        let runs = Arc::new(AtomicUsize::new(0));
        let runs_inner = Arc::clone(&runs);
        let mut registry = JobRegistry::new();
        registry.register("greeting", move |job: JobRecord, ctx: JobContext| {
            let runs = Arc::clone(&runs_inner);
            async move {
                assert_eq!(job.arg_str("name")?, "Dany");
                assert_eq!(ctx.attempt, 1);
                assert!(ctx.started_at.is_some());
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        let h = harness(registry);
        let id = push(&h.store, "greeting", JobArgs::new().with("name", "Dany"), 25).await;

        assert!(h.worker.process_next_job().await.unwrap());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(h.store.find_by_id(&id).await.unwrap().is_none());
        assert_eq!(h.store.stats().await.unwrap(), QueueStats::default());
        assert_eq!(h.worker.state_cell().get(), WorkerState::Idle);
    }

    #[tokio::test]
    async fn test_empty_queue() {
        let h = harness(JobRegistry::new());
        assert!(!h.worker.process_next_job().await.unwrap());
        assert_eq!(h.worker.state_cell().get(), WorkerState::Idle);
    }

    #[tokio::test]
    async fn test_failure_requeues_with_backoff() {
        let mut registry = JobRegistry::new();
        registry.register("flaky", |_job, _ctx| async { Err(AppError::handler("boom")) });
        let h = harness(registry);
        let id = push(&h.store, "flaky", JobArgs::new(), 25).await;

        assert!(h.worker.process_next_job().await.unwrap());
        let record = h.store.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(record.state, JobState::Pending);
        assert_eq!(record.fail_count, 1);
        assert_eq!(record.run_at, NOW + 100);
        assert_eq!(record.last_error.as_deref(), Some("Handler failure: boom"));

        // Not ready until the backoff elapses
        assert!(!h.worker.process_next_job().await.unwrap());
        h.time.advance(100);
        assert!(h.worker.process_next_job().await.unwrap());
        let record = h.store.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(record.fail_count, 2);
        assert_eq!(record.run_at, NOW + 100 + 200);
    }

    #[tokio::test]
    async fn test_single_attempt_job_goes_dead() {
        let runs = Arc::new(AtomicUsize::new(0));
        let runs_inner = Arc::clone(&runs);
        let mut registry = JobRegistry::new();
        registry.register_with_options("export", JobOptions::new().max_fails(1), move |_job, _ctx| {
            let runs = Arc::clone(&runs_inner);
            async move {
                runs.fetch_add(1, Ordering::SeqCst);
                Err(AppError::handler("export failed"))
            }
        });
        let h = harness(registry);
        let id = push(&h.store, "export", JobArgs::new(), 1).await;

        assert!(h.worker.process_next_job().await.unwrap());
        assert!(!h.worker.process_next_job().await.unwrap());
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        let dead = h.store.list_dead(10).await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].id, id);
        assert_eq!(dead[0].fail_count, 1);
        assert_eq!(dead[0].state, JobState::Dead);
    }

    #[tokio::test]
    async fn test_record_max_fails_overrides_registry_default() {
        let mut registry = JobRegistry::new();
        registry.register("flaky", |_job, _ctx| async { Err(AppError::handler("boom")) });
        let h = harness(registry);
        let id = push(&h.store, "flaky", JobArgs::new(), 1).await;

        assert!(h.worker.process_next_job().await.unwrap());
        let record = h.store.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(record.state, JobState::Dead);
        assert_eq!(record.fail_count, 1);
    }

    #[tokio::test]
    async fn test_record_max_fails_can_raise_registry_ceiling() {
        let mut registry = JobRegistry::new();
        registry.register_with_options("export", JobOptions::new().max_fails(1), |_job, _ctx| async {
            Err(AppError::handler("boom"))
        });
        let h = harness(registry);
        let id = push(&h.store, "export", JobArgs::new(), 3).await;

        assert!(h.worker.process_next_job().await.unwrap());
        let record = h.store.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(record.state, JobState::Pending);
        assert_eq!(record.fail_count, 1);
    }

    #[tokio::test]
    async fn test_unknown_job_goes_dead_immediately() {
        let h = harness(JobRegistry::new());
        push(&h.store, "nobody", JobArgs::new(), 25).await;

        assert!(h.worker.process_next_job().await.unwrap());
        let dead = h.store.list_dead(10).await.unwrap();
        assert_eq!(dead.len(), 1);
        assert!(dead[0].last_error.as_deref().unwrap().contains("nobody"));
    }

    #[tokio::test]
    async fn test_schema_violation_goes_dead_without_running() {
        let runs = Arc::new(AtomicUsize::new(0));
        let runs_inner = Arc::clone(&runs);
        let mut registry = JobRegistry::new();
        registry.register_with_options(
            "greeting",
            JobOptions::new().schema(ArgSchema::new().require_str("name")),
            move |_job, _ctx| {
                let runs = Arc::clone(&runs_inner);
                async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            },
        );
        let h = harness(registry);
        push(&h.store, "greeting", JobArgs::new().with("name", ""), 25).await;

        assert!(h.worker.process_next_job().await.unwrap());
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert_eq!(h.store.stats().await.unwrap().dead, 1);
    }

    #[tokio::test]
    async fn test_panic_is_a_retryable_failure() {
        let mut registry = JobRegistry::new();
        registry.register("explode", |_job, _ctx| async {
            if true {
                panic!("kaboom");
            }
            Ok(())
        });
        let h = harness(registry);
        let id = push(&h.store, "explode", JobArgs::new(), 25).await;

        assert!(h.worker.process_next_job().await.unwrap());
        let record = h.store.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(record.state, JobState::Pending);
        assert_eq!(record.fail_count, 1);
        assert!(record.last_error.unwrap().contains("kaboom"));
    }

    #[tokio::test]
    async fn test_store_error_propagates() {
        let h = harness(JobRegistry::new());
        h.store.set_unavailable(true);

        let err = h.worker.process_next_job().await.unwrap_err();
        assert!(matches!(err, AppError::StoreUnavailable(_)));
        assert_eq!(h.worker.state_cell().get(), WorkerState::Idle);
    }

    #[tokio::test]
    async fn test_run_exits_on_shutdown() {
        let h = harness(JobRegistry::new());
        let (tx, token) = shutdown_channel();
        let cell = h.worker.state_cell();
        let worker = Arc::new(h.worker);

        let running = Arc::clone(&worker);
        let handle = tokio::spawn(async move { running.run(token).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.shutdown();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cell.get(), WorkerState::Stopped);
    }

    #[test]
    fn test_idle_sleep_within_jitter_bounds() {
        let h = harness(JobRegistry::new());
        for _ in 0..100 {
            let d = h.worker.idle_sleep();
            assert!(d >= Duration::from_millis(49) && d <= Duration::from_millis(151), "{d:?}");
        }
    }
}

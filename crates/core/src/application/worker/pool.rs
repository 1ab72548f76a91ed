// Worker pool - N worker units plus the reaper

use super::{shutdown_channel, ShutdownSender, Worker, WorkerState, WorkerStateCell};
use crate::application::middleware::Middleware;
use crate::application::recovery::Reaper;
use crate::application::registry::{Dispatcher, JobRegistry};
use crate::application::retry::RetryPolicy;
use crate::config::QueueConfig;
use crate::error::{AppError, Result};
use crate::port::QueueStore;
use futures::future::join_all;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Lifecycle of the pool as a whole
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    Stopped,
    Running,
    /// No new claims; waiting for in-flight executions
    Draining,
}

/// Runs `concurrency` worker units against one namespace
pub struct WorkerPool {
    pool_id: String,
    config: Arc<QueueConfig>,
    store: Arc<dyn QueueStore>,
    dispatcher: Arc<Dispatcher>,
    retry_policy: Arc<RetryPolicy>,
    state: PoolState,
    cells: Vec<WorkerStateCell>,
    workers: Vec<JoinHandle<()>>,
    reaper: Option<JoinHandle<()>>,
    shutdown: Option<ShutdownSender>,
}

impl WorkerPool {
    /// Validate `config` and compile the middleware chain around every
    /// registered handler. The registry is not consulted again.
    pub fn new(
        config: QueueConfig,
        store: Arc<dyn QueueStore>,
        registry: &JobRegistry,
        middleware: Vec<Arc<dyn Middleware>>,
    ) -> Result<Self> {
        config.validate()?;
        if store.namespace() != config.namespace {
            return Err(AppError::Config(format!(
                "store namespace '{}' does not match pool namespace '{}'",
                store.namespace(),
                config.namespace
            )));
        }

        let pool_id = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
        let dispatcher = Arc::new(registry.compile(&middleware));
        info!(
            pool_id = %pool_id,
            namespace = %config.namespace,
            jobs = ?registry.registered_names(),
            middleware = ?dispatcher.middleware(),
            "Worker pool created"
        );

        Ok(Self {
            pool_id,
            retry_policy: Arc::new(RetryPolicy::from_config(&config)),
            config: Arc::new(config),
            store,
            dispatcher,
            state: PoolState::Stopped,
            cells: Vec::new(),
            workers: Vec::new(),
            reaper: None,
            shutdown: None,
        })
    }

    pub fn pool_id(&self) -> &str {
        &self.pool_id
    }

    pub fn state(&self) -> PoolState {
        self.state
    }

    /// One entry per worker unit, in spawn order
    pub fn worker_states(&self) -> Vec<WorkerState> {
        self.cells.iter().map(WorkerStateCell::get).collect()
    }

    /// Spawn the worker units and the reaper. Must be called inside a tokio runtime.
    pub fn start(&mut self) -> Result<()> {
        if self.state != PoolState::Stopped {
            return Err(AppError::Internal(format!(
                "worker pool {} is {:?}, cannot start",
                self.pool_id, self.state
            )));
        }

        let (tx, token) = shutdown_channel();
        self.cells.clear();

        for i in 0..self.config.concurrency {
            let worker = Worker::new(
                format!("{}-worker-{}", self.pool_id, i),
                Arc::clone(&self.store),
                Arc::clone(&self.dispatcher),
                Arc::clone(&self.retry_policy),
                Arc::clone(&self.config),
            );
            self.cells.push(worker.state_cell());
            let token = token.clone();
            self.workers
                .push(tokio::spawn(async move { worker.run(token).await }));
        }

        let reaper = Reaper::new(Arc::clone(&self.store), self.config.reap_interval);
        self.reaper = Some(tokio::spawn(async move { reaper.run(token).await }));

        self.shutdown = Some(tx);
        self.state = PoolState::Running;
        info!(
            pool_id = %self.pool_id,
            namespace = %self.config.namespace,
            concurrency = self.config.concurrency,
            "Worker pool started"
        );
        Ok(())
    }

    /// Stop claiming and wait up to `shutdown_grace` for in-flight executions.
    ///
    /// Returns `false` if the grace period ran out. Executions still running
    /// are left to finish on their own and still ack / requeue their job.
    pub async fn stop(&mut self) -> bool {
        let Some(tx) = self.shutdown.take() else {
            return true;
        };

        self.state = PoolState::Draining;
        info!(
            pool_id = %self.pool_id,
            grace_ms = self.config.shutdown_grace.as_millis() as u64,
            "Draining worker pool"
        );
        tx.shutdown();

        let workers = std::mem::take(&mut self.workers);
        let drained = match tokio::time::timeout(self.config.shutdown_grace, join_all(workers)).await {
            Ok(results) => {
                for result in results {
                    if let Err(e) = result {
                        error!(pool_id = %self.pool_id, error = %e, "Worker task ended abnormally");
                    }
                }
                true
            }
            Err(_) => {
                warn!(
                    pool_id = %self.pool_id,
                    "Shutdown grace elapsed with executions still in flight"
                );
                false
            }
        };

        if let Some(reaper) = self.reaper.take() {
            reaper.abort();
            let _ = reaper.await;
        }

        self.state = PoolState::Stopped;
        info!(pool_id = %self.pool_id, drained, "Worker pool stopped");
        drained
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if let Some(tx) = &self.shutdown {
            tx.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::enqueue::Enqueuer;
    use crate::application::middleware::{JobContext, LoggingMiddleware, TimingMiddleware};
    use crate::application::registry::JobOptions;
    use crate::domain::{JobArgs, JobRecord, QueueStats};
    use crate::port::id_provider::UuidProvider;
    use crate::port::time_provider::SystemTimeProvider;
    use crate::port::{InMemoryQueueStore, TimeProvider};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    fn config() -> QueueConfig {
        let mut config = QueueConfig::new("pool-test");
        config.concurrency = 4;
        config.poll_interval = Duration::from_millis(10);
        config.base_backoff = Duration::from_millis(10);
        config.max_backoff = Duration::from_millis(50);
        config.shutdown_grace = Duration::from_secs(5);
        config
    }

    fn store() -> Arc<InMemoryQueueStore> {
        let time: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
        Arc::new(InMemoryQueueStore::new("pool-test", time, 100))
    }

    fn enqueuer(store: &Arc<InMemoryQueueStore>, registry: &JobRegistry) -> Enqueuer {
        Enqueuer::new(
            store.clone(),
            Arc::new(UuidProvider),
            Arc::new(SystemTimeProvider),
            &config(),
        )
        .with_job_options(registry.job_options())
    }

    fn middleware() -> Vec<Arc<dyn Middleware>> {
        vec![Arc::new(TimingMiddleware), Arc::new(LoggingMiddleware)]
    }

    async fn wait_for_stats(store: &InMemoryQueueStore, expected: QueueStats) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if store.stats().await.unwrap() == expected {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("queue never reached {:?}", expected));
    }

    #[tokio::test]
    async fn test_greeting_runs_once_and_is_removed() {
        let greeted = Arc::new(Mutex::new(Vec::new()));
        let greeted_inner = Arc::clone(&greeted);
        let mut registry = JobRegistry::new();
        registry.register("greeting", move |job: JobRecord, _ctx: JobContext| {
            let greeted = Arc::clone(&greeted_inner);
            async move {
                let line = format!("Hello {}, {}", job.arg_str("name")?, job.arg_str("message")?);
                greeted.lock().unwrap().push(line);
                Ok(())
            }
        });

        let store = store();
        let mut pool = WorkerPool::new(config(), store.clone(), &registry, middleware()).unwrap();
        pool.start().unwrap();
        assert_eq!(pool.state(), PoolState::Running);

        enqueuer(&store, &registry)
            .enqueue(
                "greeting",
                JobArgs::new()
                    .with("name", "Dany")
                    .with("message", "How are you?"),
            )
            .await
            .unwrap();

        wait_for_stats(&store, QueueStats::default()).await;
        assert!(pool.stop().await);
        assert_eq!(pool.state(), PoolState::Stopped);
        assert_eq!(*greeted.lock().unwrap(), vec!["Hello Dany, How are you?"]);
        assert!(pool
            .worker_states()
            .iter()
            .all(|s| *s == WorkerState::Stopped));
    }

    #[tokio::test]
    async fn test_failing_single_attempt_job_is_dead_after_one_run() {
        let runs = Arc::new(AtomicUsize::new(0));
        let runs_inner = Arc::clone(&runs);
        let mut registry = JobRegistry::new();
        registry.register_with_options(
            "export",
            JobOptions::new().priority(10).max_fails(1),
            move |_job, _ctx| {
                let runs = Arc::clone(&runs_inner);
                async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Err(AppError::handler("export target unreachable"))
                }
            },
        );

        let store = store();
        let mut pool = WorkerPool::new(config(), store.clone(), &registry, middleware()).unwrap();
        pool.start().unwrap();
        enqueuer(&store, &registry)
            .enqueue("export", JobArgs::new())
            .await
            .unwrap();

        wait_for_stats(
            &store,
            QueueStats {
                dead: 1,
                ..Default::default()
            },
        )
        .await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        pool.stop().await;

        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_inner = Arc::clone(&attempts);
        let mut registry = JobRegistry::new();
        registry.register("flaky", move |_job, ctx: JobContext| {
            let attempts = Arc::clone(&attempts_inner);
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                if ctx.attempt < 3 {
                    return Err(AppError::handler("not yet"));
                }
                Ok(())
            }
        });

        let store = store();
        let mut pool = WorkerPool::new(config(), store.clone(), &registry, middleware()).unwrap();
        pool.start().unwrap();
        enqueuer(&store, &registry)
            .enqueue("flaky", JobArgs::new())
            .await
            .unwrap();

        wait_for_stats(&store, QueueStats::default()).await;
        pool.stop().await;
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_two_pools_share_namespace_without_duplicates() {
        let executions: Arc<Mutex<HashMap<String, usize>>> = Arc::new(Mutex::new(HashMap::new()));
        let executions_inner = Arc::clone(&executions);
        let mut registry = JobRegistry::new();
        registry.register("count", move |job: JobRecord, _ctx| {
            let executions = Arc::clone(&executions_inner);
            async move {
                *executions.lock().unwrap().entry(job.id.clone()).or_insert(0) += 1;
                Ok(())
            }
        });

        let store = store();
        let mut a = WorkerPool::new(config(), store.clone(), &registry, middleware()).unwrap();
        let mut b = WorkerPool::new(config(), store.clone(), &registry, vec![]).unwrap();
        assert_ne!(a.pool_id(), b.pool_id());
        a.start().unwrap();
        b.start().unwrap();

        let enqueuer = enqueuer(&store, &registry);
        for i in 0..100i64 {
            enqueuer
                .enqueue("count", JobArgs::new().with("n", i))
                .await
                .unwrap();
        }

        wait_for_stats(&store, QueueStats::default()).await;
        assert!(a.stop().await);
        assert!(b.stop().await);

        let executions = executions.lock().unwrap();
        assert_eq!(executions.len(), 100);
        assert!(executions.values().all(|n| *n == 1));
    }

    #[tokio::test]
    async fn test_stop_waits_for_in_flight_execution() {
        let finished = Arc::new(AtomicUsize::new(0));
        let finished_inner = Arc::clone(&finished);
        let mut registry = JobRegistry::new();
        registry.register("slow", move |_job, _ctx| {
            let finished = Arc::clone(&finished_inner);
            async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                finished.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        let store = store();
        let mut pool = WorkerPool::new(config(), store.clone(), &registry, vec![]).unwrap();
        pool.start().unwrap();
        enqueuer(&store, &registry)
            .enqueue("slow", JobArgs::new())
            .await
            .unwrap();

        wait_for_stats(
            &store,
            QueueStats {
                in_flight: 1,
                ..Default::default()
            },
        )
        .await;
        assert!(pool
            .worker_states()
            .iter()
            .any(|s| *s == WorkerState::Executing));

        assert!(pool.stop().await);
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert_eq!(store.stats().await.unwrap(), QueueStats::default());
    }

    #[tokio::test]
    async fn test_stop_gives_up_after_grace() {
        let mut registry = JobRegistry::new();
        registry.register("stuck", |_job, _ctx| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        });

        let store = store();
        let mut config = config();
        config.shutdown_grace = Duration::from_millis(50);
        let mut pool = WorkerPool::new(config, store.clone(), &registry, vec![]).unwrap();
        pool.start().unwrap();
        enqueuer(&store, &registry)
            .enqueue("stuck", JobArgs::new())
            .await
            .unwrap();
        wait_for_stats(
            &store,
            QueueStats {
                in_flight: 1,
                ..Default::default()
            },
        )
        .await;

        let started = std::time::Instant::now();
        assert!(!pool.stop().await);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(pool.state(), PoolState::Stopped);
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let store = store();
        let mut pool = WorkerPool::new(config(), store, &JobRegistry::new(), vec![]).unwrap();
        pool.start().unwrap();
        assert_eq!(pool.worker_states().len(), 4);
        assert!(pool.start().is_err());
        pool.stop().await;

        // Restartable once stopped
        pool.start().unwrap();
        pool.stop().await;
    }

    #[tokio::test]
    async fn test_namespace_mismatch_is_a_config_error() {
        let store = store();
        let result = WorkerPool::new(QueueConfig::new("other"), store, &JobRegistry::new(), vec![]);
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[tokio::test]
    async fn test_store_outage_is_survived() {
        let mut registry = JobRegistry::new();
        registry.register("greeting", |_job, _ctx| async { Ok(()) });

        let store = store();
        let mut config = config();
        config.error_backoff = Duration::from_millis(20);
        let mut pool = WorkerPool::new(config, store.clone(), &registry, vec![]).unwrap();
        pool.start().unwrap();

        store.set_unavailable(true);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(pool.state(), PoolState::Running);
        store.set_unavailable(false);

        enqueuer(&store, &registry)
            .enqueue("greeting", JobArgs::new())
            .await
            .unwrap();
        wait_for_stats(&store, QueueStats::default()).await;
        assert!(pool.stop().await);
    }
}

//! Tasklane - Main Entry Point
//! Composition root: store, worker pool and JSON-RPC server

mod config;
mod jobs;
mod logging;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use config::DaemonConfig;
use tasklane_api_rpc::{RpcHandler, RpcServer};
use tasklane_core::application::{
    Enqueuer, LoggingMiddleware, Middleware, TimingMiddleware, WorkerPool,
};
use tasklane_core::port::id_provider::UuidProvider;
use tasklane_core::port::time_provider::SystemTimeProvider;
use tasklane_core::port::QueueStore;
use tasklane_infra_sqlite::{create_pool, run_migrations, SqliteQueueStore};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Configuration and logging
    let config = DaemonConfig::from_env().context("invalid configuration")?;
    let _log_guard = logging::init(&config)?;

    info!(
        version = VERSION,
        namespace = %config.queue.namespace,
        db_path = %config.db_path.display(),
        "Tasklane starting"
    );

    // 2. Store
    config::ensure_parent_dir(&config.db_path)?;
    let db = create_pool(&config.store_pool())
        .await
        .context("store pool creation failed")?;
    run_migrations(&db).await.context("migration failed")?;

    // 3. DI wiring
    let time_provider = Arc::new(SystemTimeProvider);
    let store: Arc<dyn QueueStore> = Arc::new(SqliteQueueStore::new(
        db.clone(),
        config.queue.namespace.clone(),
        time_provider.clone(),
        config.queue.dead_letter_capacity,
    ));

    let registry = jobs::registry(config.export_dir.clone());
    let enqueuer = Enqueuer::new(
        store.clone(),
        Arc::new(UuidProvider),
        time_provider,
        &config.queue,
    )
    .with_job_options(registry.job_options());

    // 4. Worker pool
    let middleware: Vec<Arc<dyn Middleware>> =
        vec![Arc::new(TimingMiddleware), Arc::new(LoggingMiddleware)];
    let mut pool = WorkerPool::new(config.queue.clone(), store.clone(), &registry, middleware)?;
    pool.start()?;

    // 5. JSON-RPC server
    let rpc_server = RpcServer::new(
        config.rpc.clone(),
        RpcHandler::new(Arc::new(enqueuer), store),
    );
    let (rpc_addr, rpc_handle) = rpc_server.start().await?;

    info!(rpc_addr = %rpc_addr, concurrency = config.queue.concurrency, "System ready");

    // 6. Wait for shutdown signal
    shutdown_signal().await?;
    info!("Shutdown signal received, draining");

    // 7. Stop accepting work, then drain in-flight jobs
    if rpc_handle.stop().is_ok() {
        rpc_handle.stopped().await;
    }
    let drained = pool.stop().await;
    db.close().await;

    info!(drained, "Shutdown complete");
    Ok(())
}

/// SIGINT or SIGTERM
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate()).context("SIGTERM handler")?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res.context("SIGINT handler")?,
            _ = terminate.recv() => {},
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await.context("Ctrl+C handler")?;

    Ok(())
}

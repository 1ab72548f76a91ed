//! Shared fixtures: throwaway SQLite files and a fast queue configuration

#![allow(dead_code)]

use sqlx::SqlitePool;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tasklane_core::port::TimeProvider;
use tasklane_core::QueueConfig;
use tasklane_infra_sqlite::{create_pool, run_migrations, SqliteQueueStore, StorePoolConfig};

/// A database file removed (with its WAL side files) on drop
pub struct TempDb {
    pub path: PathBuf,
}

impl TempDb {
    pub fn new() -> Self {
        let path = std::env::temp_dir().join(format!("tasklane-it-{}.db", uuid::Uuid::new_v4()));
        Self { path }
    }

    /// A fresh connection pool on the file, as a separate process would open it
    pub async fn open(&self) -> SqlitePool {
        let mut config = StorePoolConfig::for_path(&self.path);
        config.busy_timeout = Duration::from_secs(10);
        let pool = create_pool(&config).await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    pub async fn store(
        &self,
        namespace: &str,
        time: Arc<dyn TimeProvider>,
    ) -> Arc<SqliteQueueStore> {
        Arc::new(SqliteQueueStore::new(self.open().await, namespace, time, 1_000))
    }
}

impl Drop for TempDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut file = self.path.clone().into_os_string();
            file.push(suffix);
            let _ = std::fs::remove_file(file);
        }
    }
}

/// Short intervals so scenarios finish in well under a second each
pub fn fast_config(namespace: &str) -> QueueConfig {
    QueueConfig {
        concurrency: 4,
        base_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(100),
        lease_timeout: Duration::from_secs(30),
        reap_interval: Duration::from_millis(50),
        poll_interval: Duration::from_millis(10),
        error_backoff: Duration::from_millis(20),
        shutdown_grace: Duration::from_secs(5),
        ..QueueConfig::new(namespace)
    }
}

/// Poll `check` until it returns true or `timeout` elapses
pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check().await
}

// SQLite Connection Pool Setup

use crate::error::map_sqlx_error;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tasklane_core::error::Result;
use tracing::info;

/// Bounded-pool settings for the queue store
#[derive(Debug, Clone)]
pub struct StorePoolConfig {
    /// `sqlite://path/to/file.db` or `sqlite::memory:`
    pub database_url: String,
    /// Upper bound on open connections
    pub max_connections: u32,
    /// How long a caller waits for a free connection before `StoreUnavailable`
    pub acquire_timeout: Duration,
    /// How long SQLite retries on a locked database before failing a statement
    pub busy_timeout: Duration,
}

impl Default for StorePoolConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://tasklane.db".to_string(),
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_secs(5),
        }
    }
}

impl StorePoolConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            ..Default::default()
        }
    }

    pub fn for_path(path: &Path) -> Self {
        Self::new(format!("sqlite://{}", path.display()))
    }

    /// An in-memory database lives and dies with its single connection
    pub fn is_in_memory(&self) -> bool {
        self.database_url.contains(":memory:") || self.database_url.contains("mode=memory")
    }
}

/// Create SQLite connection pool with WAL mode
///
/// In-memory databases are clamped to one connection that never expires,
/// since every connection would otherwise see its own empty database.
pub async fn create_pool(config: &StorePoolConfig) -> Result<SqlitePool> {
    let in_memory = config.is_in_memory();
    let journal_mode = if in_memory {
        SqliteJournalMode::Memory
    } else {
        SqliteJournalMode::Wal
    };

    let options = SqliteConnectOptions::from_str(&config.database_url)
        .map_err(map_sqlx_error)?
        .journal_mode(journal_mode)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(config.busy_timeout)
        .create_if_missing(true);

    let pool_options = SqlitePoolOptions::new().acquire_timeout(config.acquire_timeout);
    let pool_options = if in_memory {
        pool_options
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        pool_options.max_connections(config.max_connections.max(1))
    };

    let pool = pool_options
        .connect_with(options)
        .await
        .map_err(map_sqlx_error)?;

    info!(
        database_url = %config.database_url,
        max_connections = if in_memory { 1 } else { config.max_connections.max(1) },
        acquire_timeout_ms = config.acquire_timeout.as_millis() as u64,
        "Store pool created"
    );
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_memory_pool() {
        let pool = create_pool(&StorePoolConfig::new("sqlite::memory:"))
            .await
            .unwrap();
        assert!(pool.acquire().await.is_ok());
        assert_eq!(pool.options().get_max_connections(), 1);
    }

    #[tokio::test]
    async fn test_create_file_pool() {
        let path = std::env::temp_dir().join(format!("tasklane-conn-{}.db", uuid::Uuid::new_v4()));
        let config = StorePoolConfig {
            max_connections: 3,
            ..StorePoolConfig::for_path(&path)
        };
        assert!(!config.is_in_memory());

        let pool = create_pool(&config).await.unwrap();
        assert_eq!(pool.options().get_max_connections(), 3);
        let mode: String = sqlx::query_scalar("PRAGMA journal_mode")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");

        pool.close().await;
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_exhausted_pool_times_out() {
        let config = StorePoolConfig {
            acquire_timeout: Duration::from_millis(50),
            ..StorePoolConfig::new("sqlite::memory:")
        };
        let pool = create_pool(&config).await.unwrap();
        let _held = pool.acquire().await.unwrap();

        let err = match pool.acquire().await {
            Ok(_) => panic!("second connection should not be available"),
            Err(e) => map_sqlx_error(e),
        };
        assert!(matches!(
            err,
            tasklane_core::error::AppError::StoreUnavailable(_)
        ));
    }
}

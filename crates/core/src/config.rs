// Queue configuration
//
// Constructed once at startup and handed to the Enqueuer and WorkerPool.

use crate::error::{AppError, Result};
use std::time::Duration;

/// Default namespace shared by producers and workers
pub const DEFAULT_NAMESPACE: &str = "tasklane";

/// Default failed-attempt ceiling before dead-letter
pub const DEFAULT_MAX_FAILS: u32 = 25;

/// Maximum namespace length
const MAX_NAMESPACE_LEN: usize = 64;

/// Queue / worker pool configuration
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Namespace all store operations are scoped to
    pub namespace: String,
    /// Number of concurrent worker units
    pub concurrency: usize,
    /// Backoff for the first retry; doubled per prior failure
    pub base_backoff: Duration,
    /// Upper bound on any single retry delay
    pub max_backoff: Duration,
    /// `max_fails` stamped on records whose job type is unknown to the producer
    pub max_fails_default: u32,
    /// How long a claim stays valid without a heartbeat
    pub lease_timeout: Duration,
    /// How often the reaper scans for expired leases
    pub reap_interval: Duration,
    /// Base idle sleep when no job is ready (jittered)
    pub poll_interval: Duration,
    /// Sleep after a store error before polling again
    pub error_backoff: Duration,
    /// How long `stop()` waits for in-flight executions
    pub shutdown_grace: Duration,
    /// Maximum dead-letter entries retained per namespace
    pub dead_letter_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            concurrency: 10,
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(3600),
            max_fails_default: DEFAULT_MAX_FAILS,
            lease_timeout: Duration::from_secs(60),
            reap_interval: Duration::from_secs(15),
            poll_interval: Duration::from_millis(100),
            error_backoff: Duration::from_secs(1),
            shutdown_grace: Duration::from_secs(30),
            dead_letter_capacity: 10_000,
        }
    }
}

impl QueueConfig {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    /// Reject configurations the pool cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.namespace.is_empty() {
            return Err(AppError::Config("namespace cannot be empty".to_string()));
        }
        if self.namespace.len() > MAX_NAMESPACE_LEN {
            return Err(AppError::Config(format!(
                "namespace too long (max {} chars)",
                MAX_NAMESPACE_LEN
            )));
        }
        if !self
            .namespace
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
        {
            return Err(AppError::Config(
                "namespace must be alphanumeric with '_', '-' or '.'".to_string(),
            ));
        }
        if self.concurrency == 0 {
            return Err(AppError::Config("concurrency must be at least 1".to_string()));
        }
        if self.max_fails_default == 0 {
            return Err(AppError::Config("max_fails_default must be at least 1".to_string()));
        }
        if self.base_backoff > self.max_backoff {
            return Err(AppError::Config(
                "base_backoff cannot exceed max_backoff".to_string(),
            ));
        }
        if self.lease_timeout.is_zero() {
            return Err(AppError::Config("lease_timeout must be positive".to_string()));
        }
        if self.reap_interval.is_zero() || self.poll_interval.is_zero() {
            return Err(AppError::Config(
                "reap_interval and poll_interval must be positive".to_string(),
            ));
        }
        if self.dead_letter_capacity == 0 {
            return Err(AppError::Config(
                "dead_letter_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn lease_timeout_ms(&self) -> i64 {
        self.lease_timeout.as_millis() as i64
    }
}

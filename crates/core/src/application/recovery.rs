// Lease-expiry recovery (reaper)
use crate::application::worker::ShutdownToken;
use crate::error::Result;
use crate::port::QueueStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Returns in-flight records whose claim lease expired to the pending set
///
/// A worker that crashes or loses its connection mid-job stops renewing its
/// lease. Once the lease runs out the reaper makes the record claimable again,
/// with `fail_count` unchanged.
pub struct Reaper {
    store: Arc<dyn QueueStore>,
    interval: Duration,
}

impl Reaper {
    pub fn new(store: Arc<dyn QueueStore>, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// One scan. Returns the number of records released.
    pub async fn reap_once(&self) -> Result<u64> {
        let released = self.store.reap_expired().await?;
        if released > 0 {
            warn!(
                namespace = %self.store.namespace(),
                released,
                "Released jobs with expired leases"
            );
        } else {
            debug!(namespace = %self.store.namespace(), "No expired leases");
        }
        Ok(released)
    }

    /// Scan immediately, then every `interval` until shutdown
    pub async fn run(&self, mut shutdown: ShutdownToken) {
        info!(
            namespace = %self.store.namespace(),
            interval_ms = self.interval.as_millis() as u64,
            "Reaper started"
        );
        loop {
            if let Err(e) = self.reap_once().await {
                error!(error = %e, "Reaper scan failed");
            }
            tokio::select! {
                _ = sleep(self.interval) => {},
                _ = shutdown.wait() => break,
            }
        }
        info!(namespace = %self.store.namespace(), "Reaper stopped");
    }
}

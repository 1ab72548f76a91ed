// Worker constants (no magic values)
use std::time::Duration;

/// Lease heartbeats per `lease_timeout` while a handler runs
pub const LEASE_RENEWALS_PER_TIMEOUT: u32 = 3;

/// Floor on the heartbeat period for very short leases
pub const MIN_LEASE_RENEW_INTERVAL: Duration = Duration::from_millis(10);

/// Idle sleep is drawn uniformly from `poll_interval * (1 ± IDLE_JITTER_RATIO)`
pub const IDLE_JITTER_RATIO: f64 = 0.5;

/// Error text recorded when a handler panics without a string payload
pub const UNKNOWN_PANIC_MESSAGE: &str = "handler panicked";

// Queue Domain Model

use serde::{Deserialize, Serialize};

/// Namespace identifier (isolates unrelated queues sharing one store)
pub type Namespace = String;

/// Point-in-time counts for one namespace
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Pending and ready now
    pub pending: i64,
    /// Pending with `run_at` in the future (retry backoff or delayed enqueue)
    pub scheduled: i64,
    pub in_flight: i64,
    pub dead: i64,
}

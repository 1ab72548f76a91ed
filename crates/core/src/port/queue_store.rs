// Queue Store Port (Interface)

use crate::domain::{JobId, JobRecord, QueueStats};
use crate::error::Result;
use async_trait::async_trait;

/// Durable queue storage, scoped to a single namespace.
///
/// Every operation may fail with `AppError::StoreUnavailable`. Callers treat
/// that as transient.
///
/// Mutating operations on claimed records take the claiming `worker_id` and
/// return `false` when the record is no longer held by that worker (its lease
/// expired and the reaper released it). The caller's outcome is then dropped;
/// the job will run again, which at-least-once delivery permits.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Namespace this store instance operates on
    fn namespace(&self) -> &str;

    /// Add a new record to the pending set
    async fn push(&self, record: &JobRecord) -> Result<()>;

    /// Atomically claim the best ready record: `run_at <= now`, ordered by
    /// `(priority desc, enqueued_at asc, id asc)`.
    ///
    /// Two concurrent callers, in this or another process, never receive the
    /// same record.
    async fn claim_next(&self, worker_id: &str, lease_ms: i64) -> Result<Option<JobRecord>>;

    /// Extend the lease of a claimed record (heartbeat)
    async fn renew_lease(&self, id: &JobId, worker_id: &str, lease_ms: i64) -> Result<bool>;

    /// Remove a claimed record after success
    async fn ack(&self, id: &JobId, worker_id: &str) -> Result<bool>;

    /// Return a claimed record to pending: `fail_count += 1`, `run_at = now + delay_ms`
    async fn requeue(
        &self,
        record: &JobRecord,
        worker_id: &str,
        delay_ms: i64,
        error: &str,
    ) -> Result<bool>;

    /// Move a claimed record to the bounded dead-letter list (`fail_count += 1`)
    async fn kill(&self, record: &JobRecord, worker_id: &str, error: &str) -> Result<bool>;

    /// Release in-flight records whose lease has expired back to pending.
    ///
    /// Returns the number of records released.
    async fn reap_expired(&self) -> Result<u64>;

    /// Find a pending, in-flight or dead record by ID
    async fn find_by_id(&self, id: &JobId) -> Result<Option<JobRecord>>;

    /// Counts per logical set
    async fn stats(&self) -> Result<QueueStats>;

    /// Most recently killed records first
    async fn list_dead(&self, limit: usize) -> Result<Vec<JobRecord>>;

    /// Move a dead record back to pending with a fresh retry budget
    async fn retry_dead(&self, id: &JobId) -> Result<bool>;

    /// Delete one dead record, or all of them when `id` is `None`
    async fn purge_dead(&self, id: Option<&JobId>) -> Result<u64>;
}

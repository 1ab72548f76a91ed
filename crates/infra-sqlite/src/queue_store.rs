// SQLite QueueStore Implementation

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::sync::Arc;
use tasklane_core::domain::{JobArgs, JobId, JobRecord, JobState, QueueStats};
use tasklane_core::error::{AppError, Result};
use tasklane_core::port::{QueueStore, TimeProvider};
use tracing::debug;

const STATE_PENDING: &str = "PENDING";
const STATE_IN_FLIGHT: &str = "IN_FLIGHT";

/// Durable `QueueStore` on SQLite, scoped to one namespace.
///
/// Several processes may open the same database file; the claim statement is
/// a single `UPDATE ... RETURNING`, which SQLite serializes.
pub struct SqliteQueueStore {
    pool: SqlitePool,
    namespace: String,
    time_provider: Arc<dyn TimeProvider>,
    dead_letter_capacity: usize,
}

impl SqliteQueueStore {
    pub fn new(
        pool: SqlitePool,
        namespace: impl Into<String>,
        time_provider: Arc<dyn TimeProvider>,
        dead_letter_capacity: usize,
    ) -> Self {
        Self {
            pool,
            namespace: namespace.into(),
            time_provider,
            dead_letter_capacity: dead_letter_capacity.max(1),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl QueueStore for SqliteQueueStore {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn push(&self, record: &JobRecord) -> Result<()> {
        let arguments = serde_json::to_string(&record.arguments)?;

        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, namespace, name, arguments, enqueued_at,
                priority, max_fails, fail_count, run_at, state, last_error
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&self.namespace)
        .bind(&record.name)
        .bind(&arguments)
        .bind(record.enqueued_at)
        .bind(record.priority)
        .bind(record.max_fails)
        .bind(record.fail_count)
        .bind(record.run_at)
        .bind(STATE_PENDING)
        .bind(&record.last_error)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn claim_next(&self, worker_id: &str, lease_ms: i64) -> Result<Option<JobRecord>> {
        let now = self.time_provider.now_millis();

        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE jobs
            SET state = ?, worker_id = ?, claimed_at = ?, lease_expires_at = ?
            WHERE id = (
                SELECT id FROM jobs
                WHERE namespace = ? AND state = ? AND run_at <= ?
                ORDER BY priority DESC, enqueued_at ASC, id ASC
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .bind(STATE_IN_FLIGHT)
        .bind(worker_id)
        .bind(now)
        .bind(now.saturating_add(lease_ms))
        .bind(&self.namespace)
        .bind(STATE_PENDING)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(JobRow::into_record).transpose()
    }

    async fn renew_lease(&self, id: &JobId, worker_id: &str, lease_ms: i64) -> Result<bool> {
        let now = self.time_provider.now_millis();
        let result = sqlx::query(
            r#"
            UPDATE jobs SET lease_expires_at = ?
            WHERE id = ? AND namespace = ? AND state = ? AND worker_id = ?
            "#,
        )
        .bind(now.saturating_add(lease_ms))
        .bind(id)
        .bind(&self.namespace)
        .bind(STATE_IN_FLIGHT)
        .bind(worker_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn ack(&self, id: &JobId, worker_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM jobs WHERE id = ? AND namespace = ? AND state = ? AND worker_id = ?",
        )
        .bind(id)
        .bind(&self.namespace)
        .bind(STATE_IN_FLIGHT)
        .bind(worker_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn requeue(
        &self,
        record: &JobRecord,
        worker_id: &str,
        delay_ms: i64,
        error: &str,
    ) -> Result<bool> {
        let now = self.time_provider.now_millis();
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = ?, fail_count = fail_count + 1, run_at = ?, last_error = ?,
                worker_id = NULL, claimed_at = NULL, lease_expires_at = NULL
            WHERE id = ? AND namespace = ? AND state = ? AND worker_id = ?
            "#,
        )
        .bind(STATE_PENDING)
        .bind(now.saturating_add(delay_ms.max(0)))
        .bind(error)
        .bind(&record.id)
        .bind(&self.namespace)
        .bind(STATE_IN_FLIGHT)
        .bind(worker_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn kill(&self, record: &JobRecord, worker_id: &str, error: &str) -> Result<bool> {
        let now = self.time_provider.now_millis();
        // Opens with a write so the transaction takes the write lock up front
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let held = sqlx::query_as::<_, JobRow>(
            r#"
            DELETE FROM jobs
            WHERE id = ? AND namespace = ? AND state = ? AND worker_id = ?
            RETURNING *
            "#,
        )
        .bind(&record.id)
        .bind(&self.namespace)
        .bind(STATE_IN_FLIGHT)
        .bind(worker_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let Some(held) = held else {
            tx.rollback().await.map_err(map_sqlx_error)?;
            return Ok(false);
        };

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO dead_jobs (
                id, namespace, name, arguments, enqueued_at,
                priority, max_fails, fail_count, run_at, last_error, died_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&held.id)
        .bind(&held.namespace)
        .bind(&held.name)
        .bind(&held.arguments)
        .bind(held.enqueued_at)
        .bind(held.priority)
        .bind(held.max_fails)
        .bind(held.fail_count.saturating_add(1))
        .bind(held.run_at)
        .bind(error)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let evicted = sqlx::query(
            r#"
            DELETE FROM dead_jobs
            WHERE namespace = ? AND id NOT IN (
                SELECT id FROM dead_jobs
                WHERE namespace = ?
                ORDER BY died_at DESC, rowid DESC
                LIMIT ?
            )
            "#,
        )
        .bind(&self.namespace)
        .bind(&self.namespace)
        .bind(self.dead_letter_capacity as i64)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?
        .rows_affected();

        tx.commit().await.map_err(map_sqlx_error)?;

        if evicted > 0 {
            debug!(namespace = %self.namespace, evicted, "Evicted oldest dead-letter entries");
        }
        Ok(true)
    }

    async fn reap_expired(&self) -> Result<u64> {
        let now = self.time_provider.now_millis();
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = ?, worker_id = NULL, claimed_at = NULL, lease_expires_at = NULL
            WHERE namespace = ? AND state = ? AND lease_expires_at <= ?
            "#,
        )
        .bind(STATE_PENDING)
        .bind(&self.namespace)
        .bind(STATE_IN_FLIGHT)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn find_by_id(&self, id: &JobId) -> Result<Option<JobRecord>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = ? AND namespace = ?")
            .bind(id)
            .bind(&self.namespace)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        if let Some(row) = row {
            return row.into_record().map(Some);
        }

        let dead = sqlx::query_as::<_, JobRow>(
            "SELECT * FROM dead_jobs WHERE id = ? AND namespace = ?",
        )
        .bind(id)
        .bind(&self.namespace)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        dead.map(JobRow::into_record).transpose()
    }

    async fn stats(&self) -> Result<QueueStats> {
        let now = self.time_provider.now_millis();
        let (pending, scheduled, in_flight): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN state = ? AND run_at <= ? THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN state = ? AND run_at > ? THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN state = ? THEN 1 ELSE 0 END), 0)
            FROM jobs
            WHERE namespace = ?
            "#,
        )
        .bind(STATE_PENDING)
        .bind(now)
        .bind(STATE_PENDING)
        .bind(now)
        .bind(STATE_IN_FLIGHT)
        .bind(&self.namespace)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let dead: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM dead_jobs WHERE namespace = ?")
            .bind(&self.namespace)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(QueueStats {
            pending,
            scheduled,
            in_flight,
            dead,
        })
    }

    async fn list_dead(&self, limit: usize) -> Result<Vec<JobRecord>> {
        let rows: Vec<JobRow> = sqlx::query_as(
            r#"
            SELECT * FROM dead_jobs
            WHERE namespace = ?
            ORDER BY died_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(&self.namespace)
        .bind(limit.min(i64::MAX as usize) as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(JobRow::into_record).collect()
    }

    async fn retry_dead(&self, id: &JobId) -> Result<bool> {
        let now = self.time_provider.now_millis();
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let dead = sqlx::query_as::<_, JobRow>(
            "DELETE FROM dead_jobs WHERE id = ? AND namespace = ? RETURNING *",
        )
        .bind(id)
        .bind(&self.namespace)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let Some(dead) = dead else {
            tx.rollback().await.map_err(map_sqlx_error)?;
            return Ok(false);
        };

        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, namespace, name, arguments, enqueued_at,
                priority, max_fails, fail_count, run_at, state, last_error
            ) VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?)
            "#,
        )
        .bind(&dead.id)
        .bind(&dead.namespace)
        .bind(&dead.name)
        .bind(&dead.arguments)
        .bind(dead.enqueued_at)
        .bind(dead.priority)
        .bind(dead.max_fails)
        .bind(now)
        .bind(STATE_PENDING)
        .bind(&dead.last_error)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(true)
    }

    async fn purge_dead(&self, id: Option<&JobId>) -> Result<u64> {
        let result = match id {
            Some(id) => {
                sqlx::query("DELETE FROM dead_jobs WHERE namespace = ? AND id = ?")
                    .bind(&self.namespace)
                    .bind(id)
                    .execute(&self.pool)
                    .await
            }
            None => {
                sqlx::query("DELETE FROM dead_jobs WHERE namespace = ?")
                    .bind(&self.namespace)
                    .execute(&self.pool)
                    .await
            }
        }
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }
}

/// Row of `jobs` or `dead_jobs`; dead rows have no `state` column
#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: String,
    namespace: String,
    name: String,
    arguments: String,
    enqueued_at: i64,
    priority: i32,
    max_fails: u32,
    fail_count: u32,
    run_at: i64,
    #[sqlx(default)]
    state: Option<String>,
    last_error: Option<String>,
}

impl JobRow {
    fn into_record(self) -> Result<JobRecord> {
        let arguments: JobArgs = serde_json::from_str(&self.arguments)?;
        let state = match self.state {
            Some(state) => state.parse::<JobState>().map_err(AppError::from)?,
            None => JobState::Dead,
        };

        Ok(JobRecord {
            id: self.id,
            namespace: self.namespace,
            name: self.name,
            arguments,
            enqueued_at: self.enqueued_at,
            fail_count: self.fail_count,
            priority: self.priority,
            max_fails: self.max_fails,
            run_at: self.run_at,
            state,
            last_error: self.last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations, StorePoolConfig};
    use tasklane_core::port::time_provider::mocks::ManualTimeProvider;

    const NOW: i64 = 1_700_000_000_000;

    async fn setup(capacity: usize) -> (SqliteQueueStore, Arc<ManualTimeProvider>) {
        let pool = create_pool(&StorePoolConfig::new("sqlite::memory:"))
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();
        let time = Arc::new(ManualTimeProvider::new(NOW));
        let store = SqliteQueueStore::new(pool, "test", time.clone(), capacity);
        (store, time)
    }

    fn record(id: &str, priority: i32, enqueued_at: i64) -> JobRecord {
        let mut record = JobRecord::new(
            id,
            enqueued_at,
            "test",
            "greeting",
            JobArgs::new()
                .with("name", "Dany")
                .with("message", "How are you?")
                .with("count", 3i64),
            5,
        );
        record.priority = priority;
        record
    }

    #[tokio::test]
    async fn test_push_and_find_roundtrip() {
        let (store, _) = setup(10).await;
        let original = record("j1", 0, NOW);
        store.push(&original).await.unwrap();

        let found = store.find_by_id(&"j1".to_string()).await.unwrap().unwrap();
        assert_eq!(found, original);
    }

    #[tokio::test]
    async fn test_claim_order_priority_then_age() {
        let (store, _) = setup(10).await;
        store.push(&record("old-low", 0, NOW - 3)).await.unwrap();
        store.push(&record("new-high", 10, NOW - 1)).await.unwrap();
        store.push(&record("old-high", 10, NOW - 2)).await.unwrap();

        let mut order = Vec::new();
        while let Some(job) = store.claim_next("w", 60_000).await.unwrap() {
            assert_eq!(job.state, JobState::InFlight);
            order.push(job.id);
        }
        assert_eq!(order, vec!["old-high", "new-high", "old-low"]);
    }

    #[tokio::test]
    async fn test_scheduled_record_not_claimable_early() {
        let (store, time) = setup(10).await;
        let mut later = record("later", 0, NOW);
        later.run_at = NOW + 1_000;
        store.push(&later).await.unwrap();

        assert!(store.claim_next("w", 60_000).await.unwrap().is_none());
        assert_eq!(store.stats().await.unwrap().scheduled, 1);

        time.advance(1_000);
        assert!(store.claim_next("w", 60_000).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_ack_requires_owner() {
        let (store, _) = setup(10).await;
        store.push(&record("j1", 0, NOW)).await.unwrap();
        store.claim_next("owner", 60_000).await.unwrap().unwrap();
        let id = "j1".to_string();

        assert!(!store.ack(&id, "intruder").await.unwrap());
        assert!(store.ack(&id, "owner").await.unwrap());
        assert!(!store.ack(&id, "owner").await.unwrap());
        assert!(store.find_by_id(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_requeue_counts_failure_and_delays() {
        let (store, time) = setup(10).await;
        store.push(&record("j1", 0, NOW)).await.unwrap();
        let claimed = store.claim_next("w", 60_000).await.unwrap().unwrap();

        assert!(store.requeue(&claimed, "w", 500, "boom").await.unwrap());
        let requeued = store.find_by_id(&claimed.id).await.unwrap().unwrap();
        assert_eq!(requeued.state, JobState::Pending);
        assert_eq!(requeued.fail_count, 1);
        assert_eq!(requeued.run_at, NOW + 500);
        assert_eq!(requeued.last_error.as_deref(), Some("boom"));

        assert!(store.claim_next("w", 60_000).await.unwrap().is_none());
        time.advance(500);
        assert!(store.claim_next("w", 60_000).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_kill_moves_to_bounded_dead_list() {
        let (store, time) = setup(2).await;
        for id in ["a", "b", "c"] {
            store.push(&record(id, 0, NOW)).await.unwrap();
            let claimed = store.claim_next("w", 60_000).await.unwrap().unwrap();
            assert!(store.kill(&claimed, "w", "fatal").await.unwrap());
            time.advance(1);
        }

        let dead = store.list_dead(10).await.unwrap();
        let ids: Vec<_> = dead.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b"]);
        assert!(dead.iter().all(|r| r.state == JobState::Dead && r.fail_count == 1));

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.dead, 2);
        assert_eq!(stats.pending + stats.in_flight, 0);
    }

    #[tokio::test]
    async fn test_kill_by_non_owner_is_ignored() {
        let (store, _) = setup(10).await;
        store.push(&record("j1", 0, NOW)).await.unwrap();
        let claimed = store.claim_next("owner", 60_000).await.unwrap().unwrap();

        assert!(!store.kill(&claimed, "intruder", "fatal").await.unwrap());
        assert_eq!(store.stats().await.unwrap().in_flight, 1);
        assert_eq!(store.stats().await.unwrap().dead, 0);
    }

    #[tokio::test]
    async fn test_lease_renewal_and_reaping() {
        let (store, time) = setup(10).await;
        store.push(&record("j1", 0, NOW)).await.unwrap();
        store.claim_next("w", 1_000).await.unwrap().unwrap();
        let id = "j1".to_string();

        time.advance(900);
        assert!(store.renew_lease(&id, "w", 1_000).await.unwrap());
        time.advance(900);
        assert_eq!(store.reap_expired().await.unwrap(), 0);

        time.advance(100);
        assert_eq!(store.reap_expired().await.unwrap(), 1);
        assert!(!store.renew_lease(&id, "w", 1_000).await.unwrap());

        let reclaimed = store.claim_next("other", 1_000).await.unwrap().unwrap();
        assert_eq!(reclaimed.fail_count, 0);
        assert!(!store.ack(&id, "w").await.unwrap());
        assert!(store.ack(&id, "other").await.unwrap());
    }

    #[tokio::test]
    async fn test_retry_and_purge_dead() {
        let (store, _) = setup(10).await;
        for id in ["a", "b", "c"] {
            store.push(&record(id, 0, NOW)).await.unwrap();
            let claimed = store.claim_next("w", 60_000).await.unwrap().unwrap();
            store.kill(&claimed, "w", "fatal").await.unwrap();
        }

        assert!(store.retry_dead(&"a".to_string()).await.unwrap());
        assert!(!store.retry_dead(&"a".to_string()).await.unwrap());
        let revived = store.claim_next("w", 60_000).await.unwrap().unwrap();
        assert_eq!(revived.id, "a");
        assert_eq!(revived.fail_count, 0);

        assert_eq!(store.purge_dead(Some(&"b".to_string())).await.unwrap(), 1);
        assert_eq!(store.purge_dead(None).await.unwrap(), 1);
        assert_eq!(store.stats().await.unwrap().dead, 0);
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let (store, time) = setup(10).await;
        let other = SqliteQueueStore::new(store.pool().clone(), "other", time, 10);
        store.push(&record("j1", 0, NOW)).await.unwrap();

        assert!(other.claim_next("w", 60_000).await.unwrap().is_none());
        assert_eq!(other.stats().await.unwrap(), QueueStats::default());
        assert!(store.claim_next("w", 60_000).await.unwrap().is_some());
    }
}

//! In-memory queue store
//!
//! Suitable for tests, development and single-process embedding. Nothing
//! survives a restart, and the namespace is only shared between handles
//! cloned from the same instance.

use crate::domain::{JobId, JobRecord, JobState, QueueStats};
use crate::error::{AppError, Result};
use crate::port::{QueueStore, TimeProvider};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

struct Claim {
    record: JobRecord,
    worker_id: String,
    lease_expires_at: i64,
}

#[derive(Default)]
struct Inner {
    pending: HashMap<JobId, JobRecord>,
    in_flight: HashMap<JobId, Claim>,
    /// Bounded; newest at the back
    dead: VecDeque<JobRecord>,
}

/// In-memory `QueueStore`
#[derive(Clone)]
pub struct InMemoryQueueStore {
    namespace: String,
    inner: Arc<Mutex<Inner>>,
    time_provider: Arc<dyn TimeProvider>,
    dead_letter_capacity: usize,
    /// Fault injection: when set, every operation fails with `StoreUnavailable`
    unavailable: Arc<AtomicBool>,
}

impl InMemoryQueueStore {
    pub fn new(
        namespace: impl Into<String>,
        time_provider: Arc<dyn TimeProvider>,
        dead_letter_capacity: usize,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            inner: Arc::new(Mutex::new(Inner::default())),
            time_provider,
            dead_letter_capacity: dead_letter_capacity.max(1),
            unavailable: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Simulate the backing store going away (or coming back)
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::StoreUnavailable(
                "in-memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }

    fn push_dead(&self, inner: &mut Inner, record: JobRecord) {
        if inner.dead.len() >= self.dead_letter_capacity {
            inner.dead.pop_front();
        }
        inner.dead.push_back(record);
    }

    /// Remove `id` from in-flight if `worker_id` still holds it
    fn take_claim(inner: &mut Inner, id: &JobId, worker_id: &str) -> Option<JobRecord> {
        let owned = inner
            .in_flight
            .get(id)
            .is_some_and(|claim| claim.worker_id == worker_id);
        if owned {
            inner.in_flight.remove(id).map(|c| c.record)
        } else {
            None
        }
    }
}

#[async_trait]
impl QueueStore for InMemoryQueueStore {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn push(&self, record: &JobRecord) -> Result<()> {
        self.check_available()?;
        let mut inner = self.inner.lock().await;
        if inner.pending.contains_key(&record.id) || inner.in_flight.contains_key(&record.id) {
            return Err(AppError::Internal(format!("duplicate job id {}", record.id)));
        }
        let mut record = record.clone();
        record.state = JobState::Pending;
        inner.pending.insert(record.id.clone(), record);
        Ok(())
    }

    async fn claim_next(&self, worker_id: &str, lease_ms: i64) -> Result<Option<JobRecord>> {
        self.check_available()?;
        let now = self.time_provider.now_millis();
        let mut inner = self.inner.lock().await;

        let best = inner
            .pending
            .values()
            .filter(|r| r.is_ready(now))
            .min_by(|a, b| {
                b.priority
                    .cmp(&a.priority)
                    .then(a.enqueued_at.cmp(&b.enqueued_at))
                    .then(a.id.cmp(&b.id))
            })
            .map(|r| r.id.clone());

        let Some(id) = best else {
            return Ok(None);
        };
        let Some(mut record) = inner.pending.remove(&id) else {
            return Ok(None);
        };
        record.claim()?;

        inner.in_flight.insert(
            id,
            Claim {
                record: record.clone(),
                worker_id: worker_id.to_string(),
                lease_expires_at: now + lease_ms,
            },
        );
        Ok(Some(record))
    }

    async fn renew_lease(&self, id: &JobId, worker_id: &str, lease_ms: i64) -> Result<bool> {
        self.check_available()?;
        let now = self.time_provider.now_millis();
        let mut inner = self.inner.lock().await;
        match inner.in_flight.get_mut(id) {
            Some(claim) if claim.worker_id == worker_id => {
                claim.lease_expires_at = now + lease_ms;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn ack(&self, id: &JobId, worker_id: &str) -> Result<bool> {
        self.check_available()?;
        let mut inner = self.inner.lock().await;
        Ok(Self::take_claim(&mut inner, id, worker_id).is_some())
    }

    async fn requeue(
        &self,
        record: &JobRecord,
        worker_id: &str,
        delay_ms: i64,
        error: &str,
    ) -> Result<bool> {
        self.check_available()?;
        let now = self.time_provider.now_millis();
        let mut inner = self.inner.lock().await;
        let Some(mut held) = Self::take_claim(&mut inner, &record.id, worker_id) else {
            return Ok(false);
        };
        held.requeue(now, delay_ms, error)?;
        inner.pending.insert(held.id.clone(), held);
        Ok(true)
    }

    async fn kill(&self, record: &JobRecord, worker_id: &str, error: &str) -> Result<bool> {
        self.check_available()?;
        let mut inner = self.inner.lock().await;
        let Some(mut held) = Self::take_claim(&mut inner, &record.id, worker_id) else {
            return Ok(false);
        };
        held.kill(error)?;
        self.push_dead(&mut inner, held);
        Ok(true)
    }

    async fn reap_expired(&self) -> Result<u64> {
        self.check_available()?;
        let now = self.time_provider.now_millis();
        let mut inner = self.inner.lock().await;

        let expired: Vec<JobId> = inner
            .in_flight
            .iter()
            .filter(|(_, claim)| claim.lease_expires_at <= now)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            if let Some(claim) = inner.in_flight.remove(id) {
                let mut record = claim.record;
                record.release()?;
                inner.pending.insert(id.clone(), record);
            }
        }
        Ok(expired.len() as u64)
    }

    async fn find_by_id(&self, id: &JobId) -> Result<Option<JobRecord>> {
        self.check_available()?;
        let inner = self.inner.lock().await;
        if let Some(record) = inner.pending.get(id) {
            return Ok(Some(record.clone()));
        }
        if let Some(claim) = inner.in_flight.get(id) {
            return Ok(Some(claim.record.clone()));
        }
        Ok(inner.dead.iter().find(|r| &r.id == id).cloned())
    }

    async fn stats(&self) -> Result<QueueStats> {
        self.check_available()?;
        let now = self.time_provider.now_millis();
        let inner = self.inner.lock().await;
        let ready = inner.pending.values().filter(|r| r.run_at <= now).count() as i64;
        Ok(QueueStats {
            pending: ready,
            scheduled: inner.pending.len() as i64 - ready,
            in_flight: inner.in_flight.len() as i64,
            dead: inner.dead.len() as i64,
        })
    }

    async fn list_dead(&self, limit: usize) -> Result<Vec<JobRecord>> {
        self.check_available()?;
        let inner = self.inner.lock().await;
        Ok(inner.dead.iter().rev().take(limit).cloned().collect())
    }

    async fn retry_dead(&self, id: &JobId) -> Result<bool> {
        self.check_available()?;
        let now = self.time_provider.now_millis();
        let mut inner = self.inner.lock().await;
        let Some(pos) = inner.dead.iter().position(|r| &r.id == id) else {
            return Ok(false);
        };
        if let Some(mut record) = inner.dead.remove(pos) {
            record.revive(now)?;
            inner.pending.insert(record.id.clone(), record);
        }
        Ok(true)
    }

    async fn purge_dead(&self, id: Option<&JobId>) -> Result<u64> {
        self.check_available()?;
        let mut inner = self.inner.lock().await;
        match id {
            Some(id) => {
                let before = inner.dead.len();
                inner.dead.retain(|r| &r.id != id);
                Ok((before - inner.dead.len()) as u64)
            }
            None => {
                let count = inner.dead.len() as u64;
                inner.dead.clear();
                Ok(count)
            }
        }
    }
}

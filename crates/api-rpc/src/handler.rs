//! RPC Method Handlers
//!
//! Implements the business logic for each JSON-RPC method.

use crate::error::to_rpc_error;
use crate::types::{
    DeadListRequest, DeadListResponse, DeadPurgeRequest, DeadPurgeResponse, DeadRetryRequest,
    DeadRetryResponse, GetJobRequest, StatsResponse, SubmitRequest, SubmitResponse,
};
use jsonrpsee::types::ErrorObjectOwned;
use std::sync::Arc;
use std::time::Duration;
use tasklane_core::application::{EnqueueOptions, Enqueuer};
use tasklane_core::domain::{JobRecord, JobState};
use tasklane_core::error::AppError;
use tasklane_core::port::QueueStore;
use tracing::info;

/// Default and maximum page size for admin.dead.list.v1
const DEFAULT_DEAD_LIST_LIMIT: usize = 100;
const MAX_DEAD_LIST_LIMIT: usize = 1_000;

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    enqueuer: Arc<Enqueuer>,
    store: Arc<dyn QueueStore>,
    start_time: std::time::Instant,
}

impl RpcHandler {
    pub fn new(enqueuer: Arc<Enqueuer>, store: Arc<dyn QueueStore>) -> Self {
        Self {
            enqueuer,
            store,
            start_time: std::time::Instant::now(),
        }
    }

    /// jobs.submit.v1
    pub async fn submit(&self, params: SubmitRequest) -> Result<SubmitResponse, ErrorObjectOwned> {
        let mut options = EnqueueOptions::default();
        if let Some(priority) = params.priority {
            options = options.priority(priority);
        }
        if let Some(max_fails) = params.max_fails {
            options = options.max_fails(max_fails);
        }
        if let Some(delay_ms) = params.delay_ms {
            options = options.delay(Duration::from_millis(delay_ms));
        }

        let job_id = self
            .enqueuer
            .enqueue_with(&params.name, params.arguments, options)
            .await
            .map_err(to_rpc_error)?;

        Ok(SubmitResponse {
            job_id,
            name: params.name,
            namespace: self.enqueuer.namespace().to_string(),
            state: JobState::Pending.to_string(),
        })
    }

    /// jobs.get.v1
    pub async fn get_job(&self, params: GetJobRequest) -> Result<JobRecord, ErrorObjectOwned> {
        self.store
            .find_by_id(&params.job_id)
            .await
            .map_err(to_rpc_error)?
            .ok_or_else(|| to_rpc_error(AppError::NotFound(format!("Job {} not found", params.job_id))))
    }

    /// admin.stats.v1
    pub async fn stats(&self) -> Result<StatsResponse, ErrorObjectOwned> {
        let stats = self.store.stats().await.map_err(to_rpc_error)?;

        Ok(StatsResponse {
            namespace: self.store.namespace().to_string(),
            pending: stats.pending,
            scheduled: stats.scheduled,
            in_flight: stats.in_flight,
            dead: stats.dead,
            uptime_seconds: self.start_time.elapsed().as_secs() as i64,
        })
    }

    /// admin.dead.list.v1
    pub async fn dead_list(
        &self,
        params: DeadListRequest,
    ) -> Result<DeadListResponse, ErrorObjectOwned> {
        let limit = params
            .limit
            .unwrap_or(DEFAULT_DEAD_LIST_LIMIT)
            .min(MAX_DEAD_LIST_LIMIT);
        let jobs = self.store.list_dead(limit).await.map_err(to_rpc_error)?;
        Ok(DeadListResponse { jobs })
    }

    /// admin.dead.retry.v1
    pub async fn dead_retry(
        &self,
        params: DeadRetryRequest,
    ) -> Result<DeadRetryResponse, ErrorObjectOwned> {
        let retried = self
            .store
            .retry_dead(&params.job_id)
            .await
            .map_err(to_rpc_error)?;
        if retried {
            info!(job_id = %params.job_id, "Dead job moved back to pending");
        }

        Ok(DeadRetryResponse {
            job_id: params.job_id,
            retried,
        })
    }

    /// admin.dead.purge.v1
    pub async fn dead_purge(
        &self,
        params: DeadPurgeRequest,
    ) -> Result<DeadPurgeResponse, ErrorObjectOwned> {
        let purged = self
            .store
            .purge_dead(params.job_id.as_ref())
            .await
            .map_err(to_rpc_error)?;
        info!(purged, "Dead jobs purged");

        Ok(DeadPurgeResponse { purged })
    }
}

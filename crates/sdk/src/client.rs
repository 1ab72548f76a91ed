//! Tasklane Client Implementation

use crate::error::{Result, SdkError};
use crate::types::{DeadList, Job, PurgeResponse, RetryResponse, Stats, SubmitRequest, SubmitResponse};
use jsonrpsee::core::client::ClientT;
use jsonrpsee::core::params::ObjectParams;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use serde::Serialize;
use std::time::Duration;

/// Tasklane daemon client
///
/// # Example
///
/// ```no_run
/// use tasklane_sdk::{SubmitRequest, TasklaneClient};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = TasklaneClient::connect("http://127.0.0.1:9627").await?;
/// let response = client
///     .submit(
///         SubmitRequest::new("greeting")
///             .arg("name", "Dany")
///             .arg("message", "How are you?"),
///     )
///     .await?;
/// println!("Job ID: {}", response.job_id);
/// # Ok(())
/// # }
/// ```
pub struct TasklaneClient {
    client: HttpClient,
}

impl TasklaneClient {
    /// Connect to the daemon's RPC endpoint (e.g. `http://127.0.0.1:9627`)
    pub async fn connect(url: impl AsRef<str>) -> Result<Self> {
        let url = url.as_ref();

        let client = HttpClientBuilder::default()
            .request_timeout(Duration::from_secs(30))
            .build(url)
            .map_err(|e| SdkError::Connection(format!("Failed to create client: {}", e)))?;

        Ok(Self { client })
    }

    /// Submit a job. Validation failures come back as `SdkError::Rpc` with
    /// code 4000 and nothing is enqueued.
    pub async fn submit(&self, request: SubmitRequest) -> Result<SubmitResponse> {
        let response = self
            .client
            .request("jobs.submit.v1", object_params(&request)?)
            .await?;
        Ok(response)
    }

    /// Look up a job by ID; `None` once it has been acked or purged
    pub async fn get_job(&self, job_id: impl Into<String>) -> Result<Option<Job>> {
        let mut params = ObjectParams::new();
        params.insert("job_id", job_id.into())?;

        match self.client.request("jobs.get.v1", params).await {
            Ok(job) => Ok(Some(job)),
            Err(e) => match SdkError::from(e) {
                SdkError::Rpc { code, .. } if code == crate::error::code::NOT_FOUND => Ok(None),
                other => Err(other),
            },
        }
    }

    pub async fn stats(&self) -> Result<Stats> {
        let response = self.client.request("admin.stats.v1", rpc_params![]).await?;
        Ok(response)
    }

    /// Most recently killed jobs first
    pub async fn list_dead(&self, limit: Option<usize>) -> Result<Vec<Job>> {
        let mut params = ObjectParams::new();
        if let Some(limit) = limit {
            params.insert("limit", limit)?;
        }
        let response: DeadList = self.client.request("admin.dead.list.v1", params).await?;
        Ok(response.jobs)
    }

    /// Move a dead job back to pending with a fresh retry budget
    pub async fn retry_dead(&self, job_id: impl Into<String>) -> Result<RetryResponse> {
        let mut params = ObjectParams::new();
        params.insert("job_id", job_id.into())?;
        let response = self.client.request("admin.dead.retry.v1", params).await?;
        Ok(response)
    }

    /// Delete one dead job, or every dead job when `job_id` is `None`.
    /// Returns how many were deleted.
    pub async fn purge_dead(&self, job_id: Option<&str>) -> Result<u64> {
        let mut params = ObjectParams::new();
        if let Some(job_id) = job_id {
            params.insert("job_id", job_id)?;
        }
        let response: PurgeResponse = self.client.request("admin.dead.purge.v1", params).await?;
        Ok(response.purged)
    }
}

/// Send a request struct as named parameters
fn object_params<T: Serialize>(request: &T) -> Result<ObjectParams> {
    let mut params = ObjectParams::new();
    match serde_json::to_value(request)? {
        serde_json::Value::Object(fields) => {
            for (key, value) in fields {
                params.insert(&key, value)?;
            }
            Ok(params)
        }
        other => Err(SdkError::Other(format!(
            "request must serialize to an object, got {}",
            other
        ))),
    }
}

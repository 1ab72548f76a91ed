//! RPC Request/Response Types

use serde::{Deserialize, Serialize};
use tasklane_core::domain::{JobArgs, JobRecord, Priority};

/// jobs.submit.v1 - Enqueue a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub name: String,
    #[serde(default)]
    pub arguments: JobArgs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_fails: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub job_id: String,
    pub name: String,
    pub namespace: String,
    pub state: String,
}

/// jobs.get.v1 - Look up a pending, in-flight or dead job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetJobRequest {
    pub job_id: String,
}

/// admin.stats.v1 - Queue statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub namespace: String,
    pub pending: i64,
    pub scheduled: i64,
    pub in_flight: i64,
    pub dead: i64,
    pub uptime_seconds: i64,
}

/// admin.dead.list.v1 - Most recent dead jobs first
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeadListRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadListResponse {
    pub jobs: Vec<JobRecord>,
}

/// admin.dead.retry.v1 - Move a dead job back to pending
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadRetryRequest {
    pub job_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadRetryResponse {
    pub job_id: String,
    pub retried: bool,
}

/// admin.dead.purge.v1 - Delete one dead job, or all of them
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeadPurgeRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadPurgeResponse {
    pub purged: u64,
}

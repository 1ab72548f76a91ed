//! SDK Request/Response Types
//!
//! Mirrors the JSON-RPC types from the api-rpc crate.

use serde::{Deserialize, Serialize};

/// Job arguments: a flat JSON object of string, integer, float or bool values
pub type Arguments = serde_json::Map<String, serde_json::Value>;

/// Request to submit a new job
#[derive(Debug, Clone, Default, Serialize)]
pub struct SubmitRequest {
    pub name: String,
    pub arguments: Arguments,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_fails: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
}

impl SubmitRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn max_fails(mut self, max_fails: u32) -> Self {
        self.max_fails = Some(max_fails);
        self
    }

    pub fn delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = Some(delay_ms);
        self
    }
}

/// Response from submit operation
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResponse {
    pub job_id: String,
    pub name: String,
    pub namespace: String,
    pub state: String,
}

/// A job as stored by the daemon (pending, in flight or dead)
#[derive(Debug, Clone, Deserialize)]
pub struct Job {
    pub id: String,
    pub namespace: String,
    pub name: String,
    pub arguments: Arguments,
    pub enqueued_at: i64,
    pub fail_count: u32,
    pub priority: i32,
    pub max_fails: u32,
    pub run_at: i64,
    pub state: String,
    pub last_error: Option<String>,
}

/// Queue statistics
#[derive(Debug, Clone, Deserialize)]
pub struct Stats {
    pub namespace: String,
    pub pending: i64,
    pub scheduled: i64,
    pub in_flight: i64,
    pub dead: i64,
    pub uptime_seconds: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct DeadList {
    pub jobs: Vec<Job>,
}

/// Response from retrying a dead job
#[derive(Debug, Clone, Deserialize)]
pub struct RetryResponse {
    pub job_id: String,
    pub retried: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct PurgeResponse {
    pub purged: u64,
}

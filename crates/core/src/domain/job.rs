// Job Record Domain Model

use crate::domain::args::{ArgSchema, JobArgs};
use crate::domain::error::{DomainError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Job ID (UUID v4)
pub type JobId = String;

/// Priority (higher number = higher priority)
pub type Priority = i32;

/// Which logical set a record currently belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    /// Ready, or scheduled for a later `run_at`
    Pending,
    /// Claimed by exactly one worker
    InFlight,
    /// Retries exhausted or permanently unrunnable
    Dead,
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Pending => write!(f, "PENDING"),
            JobState::InFlight => write!(f, "IN_FLIGHT"),
            JobState::Dead => write!(f, "DEAD"),
        }
    }
}

impl FromStr for JobState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(JobState::Pending),
            "IN_FLIGHT" => Ok(JobState::InFlight),
            "DEAD" => Ok(JobState::Dead),
            other => Err(DomainError::UnknownState(other.to_string())),
        }
    }
}

/// Job Record: the serializable unit of work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub namespace: String,
    pub name: String,
    pub arguments: JobArgs,

    pub enqueued_at: i64, // epoch ms
    pub fail_count: u32,
    pub priority: Priority,
    pub max_fails: u32,
    pub run_at: i64, // epoch ms, earliest claim time

    pub state: JobState,
    pub last_error: Option<String>,
}

impl JobRecord {
    /// Create a new pending record, ready immediately
    ///
    /// # Arguments
    ///
    /// * `id` - Unique job ID (injected, not generated)
    /// * `enqueued_at` - Creation timestamp in epoch ms (injected, not system time)
    /// * `namespace` - Queue namespace
    /// * `name` - Handler key
    /// * `arguments` - Job arguments
    /// * `max_fails` - Failed attempts allowed before dead-letter
    pub fn new(
        id: impl Into<String>,
        enqueued_at: i64,
        namespace: impl Into<String>,
        name: impl Into<String>,
        arguments: JobArgs,
        max_fails: u32,
    ) -> Self {
        Self {
            id: id.into(),
            namespace: namespace.into(),
            name: name.into(),
            arguments,
            enqueued_at,
            fail_count: 0,
            priority: 0,
            max_fails,
            run_at: enqueued_at,
            state: JobState::Pending,
            last_error: None,
        }
    }

    /// Create a test record with deterministic ID and timestamp.
    ///
    /// IDs are `test-1`, `test-2`, ...; timestamps start at 1000 and step by 1000.
    ///
    /// **Note**: test-only convenience. Production code injects ID and time via providers.
    pub fn new_test(namespace: impl Into<String>, name: impl Into<String>, arguments: JobArgs) -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static TEST_COUNTER: AtomicU64 = AtomicU64::new(1);

        let counter = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        Self::new(
            format!("test-{}", counter),
            (counter * 1000) as i64,
            namespace,
            name,
            arguments,
            crate::config::DEFAULT_MAX_FAILS,
        )
    }

    /// Whether the record may be claimed at `now_millis`
    pub fn is_ready(&self, now_millis: i64) -> bool {
        self.state == JobState::Pending && self.run_at <= now_millis
    }

    /// Attempt number of the next execution (1-based)
    pub fn attempt(&self) -> u32 {
        self.fail_count + 1
    }

    /// Whether one more failure exhausts the retry budget
    pub fn is_last_attempt(&self, max_fails: u32) -> bool {
        self.fail_count + 1 >= max_fails
    }

    pub fn validate_args(&self, schema: &ArgSchema) -> crate::error::Result<()> {
        schema.validate(&self.arguments)
    }

    pub fn arg_str(&self, key: &str) -> crate::error::Result<&str> {
        self.arguments.str(key)
    }

    pub fn arg_i64(&self, key: &str) -> crate::error::Result<i64> {
        self.arguments.i64(key)
    }

    pub fn arg_f64(&self, key: &str) -> crate::error::Result<f64> {
        self.arguments.f64(key)
    }

    pub fn arg_bool(&self, key: &str) -> crate::error::Result<bool> {
        self.arguments.bool(key)
    }

    /// Pending -> InFlight
    pub fn claim(&mut self) -> Result<()> {
        self.transition(JobState::Pending, JobState::InFlight)
    }

    /// InFlight -> Pending, counting the failed attempt
    pub fn requeue(&mut self, now_millis: i64, delay_ms: i64, error: impl Into<String>) -> Result<()> {
        self.transition(JobState::InFlight, JobState::Pending)?;
        self.fail_count += 1;
        self.run_at = now_millis + delay_ms.max(0);
        self.last_error = Some(error.into());
        Ok(())
    }

    /// InFlight -> Dead, counting the failed attempt
    pub fn kill(&mut self, error: impl Into<String>) -> Result<()> {
        self.transition(JobState::InFlight, JobState::Dead)?;
        self.fail_count += 1;
        self.last_error = Some(error.into());
        Ok(())
    }

    /// InFlight -> Pending after lease expiry; the attempt is not counted
    pub fn release(&mut self) -> Result<()> {
        self.transition(JobState::InFlight, JobState::Pending)
    }

    /// Dead -> Pending with a fresh retry budget (manual retry from dead-letter)
    pub fn revive(&mut self, now_millis: i64) -> Result<()> {
        self.transition(JobState::Dead, JobState::Pending)?;
        self.fail_count = 0;
        self.run_at = now_millis;
        Ok(())
    }

    fn transition(&mut self, from: JobState, to: JobState) -> Result<()> {
        if self.state != from {
            return Err(DomainError::InvalidStateTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }
        self.state = to;
        Ok(())
    }
}

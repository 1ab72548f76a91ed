// Enqueue Use Case

use crate::application::registry::JobOptions;
use crate::domain::{ArgValue, JobArgs, JobId, JobRecord, Priority};
use crate::error::{AppError, Result};
use crate::port::{IdProvider, QueueStore, TimeProvider};
use std::time::Duration;
use tracing::debug;

/// Maximum job name length (characters)
pub const MAX_NAME_LEN: usize = 128;

/// Maximum number of arguments per job
pub const MAX_ARGUMENTS: usize = 64;

/// Maximum size of a single string argument (bytes)
pub const MAX_STRING_ARG_BYTES: usize = 64 * 1024;

/// Per-call overrides; unset fields fall back to job options, then config
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnqueueOptions {
    pub priority: Option<Priority>,
    pub max_fails: Option<u32>,
    pub delay: Option<Duration>,
}

impl EnqueueOptions {
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn max_fails(mut self, max_fails: u32) -> Self {
        self.max_fails = Some(max_fails);
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Shape checks that need no knowledge of the job type
pub fn validate_request(name: &str, args: &JobArgs) -> Result<()> {
    if name.is_empty() {
        return Err(AppError::Validation("job name cannot be empty".to_string()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(AppError::Validation(format!(
            "job name too long (max {} characters)",
            MAX_NAME_LEN
        )));
    }
    if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(AppError::Validation(format!(
            "job name '{}' must not contain whitespace or control characters",
            name.escape_debug()
        )));
    }

    if args.len() > MAX_ARGUMENTS {
        return Err(AppError::Validation(format!(
            "too many arguments: {} (max {})",
            args.len(),
            MAX_ARGUMENTS
        )));
    }
    for key in args.keys() {
        if key.is_empty() {
            return Err(AppError::Validation(
                "argument key cannot be empty".to_string(),
            ));
        }
        if let Some(ArgValue::String(s)) = args.get(key) {
            if s.len() > MAX_STRING_ARG_BYTES {
                return Err(AppError::Validation(format!(
                    "argument '{}' too large: {} bytes (max {})",
                    key,
                    s.len(),
                    MAX_STRING_ARG_BYTES
                )));
            }
        }
    }

    Ok(())
}

/// Execute enqueue use case
///
/// All validation happens before the store is touched.
///
/// # Arguments
///
/// * `known` - options of the job type, when the producer knows it
/// * `max_fails_default` - ceiling used when neither the call nor `known` sets one
#[allow(clippy::too_many_arguments)]
pub async fn execute(
    store: &dyn QueueStore,
    id_provider: &dyn IdProvider,
    time_provider: &dyn TimeProvider,
    known: Option<&JobOptions>,
    max_fails_default: u32,
    name: &str,
    arguments: JobArgs,
    options: EnqueueOptions,
) -> Result<JobId> {
    validate_request(name, &arguments)?;
    if let Some(known) = known {
        known.schema.validate(&arguments)?;
    }

    let max_fails = options
        .max_fails
        .or(known.map(|k| k.max_fails))
        .unwrap_or(max_fails_default);
    if max_fails == 0 {
        return Err(AppError::Validation(
            "max_fails must be at least 1".to_string(),
        ));
    }
    let priority = options
        .priority
        .or(known.map(|k| k.priority))
        .unwrap_or(0);
    let delay_ms = options
        .delay
        .map(|d| d.as_millis().min(i64::MAX as u128) as i64)
        .unwrap_or(0);

    let job_id = id_provider.generate_id();
    let now = time_provider.now_millis();

    let mut record = JobRecord::new(
        job_id.clone(),
        now,
        store.namespace(),
        name,
        arguments,
        max_fails,
    );
    record.priority = priority;
    record.run_at = now.saturating_add(delay_ms);

    store.push(&record).await?;

    debug!(
        job_id = %job_id,
        job_name = %name,
        namespace = %store.namespace(),
        priority,
        max_fails,
        run_at = record.run_at,
        "Job enqueued"
    );

    Ok(job_id)
}

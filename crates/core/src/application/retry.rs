// Retry / dead-letter decision
use crate::config::QueueConfig;
use crate::domain::JobRecord;
use crate::error::AppError;
use std::time::Duration;
use tracing::{info, warn};

/// Exponent cap; `1 << 62` still fits in i64
const MAX_BACKOFF_EXPONENT: u32 = 62;

/// Outcome for a failed attempt
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Requeue with this delay in ms
    Retry(i64),
    /// Move to the dead-letter list
    Dead,
}

/// Capped exponential backoff
///
/// `delay = min(base * 2^fail_count, max)` where `fail_count` is the number of
/// failures before the current one. No jitter: delays are non-decreasing in
/// `fail_count`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    base_delay_ms: i64,
    max_delay_ms: i64,
}

impl RetryPolicy {
    pub fn new(base: Duration, max: Duration) -> Self {
        let base_delay_ms = base.as_millis().min(i64::MAX as u128) as i64;
        let max_delay_ms = max.as_millis().min(i64::MAX as u128) as i64;
        Self {
            base_delay_ms,
            max_delay_ms: max_delay_ms.max(base_delay_ms),
        }
    }

    pub fn from_config(config: &QueueConfig) -> Self {
        Self::new(config.base_backoff, config.max_backoff)
    }

    /// Delay before the next attempt after `fail_count` earlier failures
    pub fn backoff_ms(&self, fail_count: u32) -> i64 {
        if fail_count > MAX_BACKOFF_EXPONENT {
            return self.max_delay_ms;
        }
        self.base_delay_ms
            .saturating_mul(1i64 << fail_count)
            .min(self.max_delay_ms)
    }

    /// Decide what happens to `job` after its current attempt failed with `error`
    ///
    /// Non-retryable errors go straight to the dead-letter list. Otherwise the
    /// job dies once this failure brings it to `max_fails`.
    pub fn decide(&self, job: &JobRecord, max_fails: u32, error: &AppError) -> RetryDecision {
        if !error.is_retryable() {
            warn!(
                job_id = %job.id,
                job_name = %job.name,
                error = %error,
                "Permanent failure, skipping retries"
            );
            return RetryDecision::Dead;
        }

        if job.is_last_attempt(max_fails) {
            warn!(
                job_id = %job.id,
                job_name = %job.name,
                fail_count = job.fail_count + 1,
                max_fails,
                "Max fail count reached"
            );
            return RetryDecision::Dead;
        }

        let delay_ms = self.backoff_ms(job.fail_count);
        info!(
            job_id = %job.id,
            job_name = %job.name,
            attempt = job.attempt(),
            max_fails,
            delay_ms,
            "Scheduling retry"
        );
        RetryDecision::Retry(delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::JobArgs;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(Duration::from_secs(1), Duration::from_secs(60))
    }

    fn job_with_failures(fail_count: u32) -> JobRecord {
        let mut job = JobRecord::new_test("ns", "export", JobArgs::new());
        job.fail_count = fail_count;
        job
    }

    #[test]
    fn test_backoff_doubles_then_caps() {
        let policy = policy();
        assert_eq!(policy.backoff_ms(0), 1_000);
        assert_eq!(policy.backoff_ms(1), 2_000);
        assert_eq!(policy.backoff_ms(5), 32_000);
        assert_eq!(policy.backoff_ms(6), 60_000);
        assert_eq!(policy.backoff_ms(200), 60_000);
    }

    #[test]
    fn test_backoff_is_monotonic() {
        let policy = policy();
        let delays: Vec<i64> = (0..80).map(|n| policy.backoff_ms(n)).collect();
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_retry_below_ceiling() {
        let decision = policy().decide(&job_with_failures(2), 5, &AppError::handler("boom"));
        assert_eq!(decision, RetryDecision::Retry(4_000));
    }

    #[test]
    fn test_dead_at_ceiling() {
        // 5th failure with max_fails = 5
        let decision = policy().decide(&job_with_failures(4), 5, &AppError::handler("boom"));
        assert_eq!(decision, RetryDecision::Dead);
    }

    #[test]
    fn test_single_attempt_job_dies_on_first_failure() {
        let decision = policy().decide(&job_with_failures(0), 1, &AppError::handler("boom"));
        assert_eq!(decision, RetryDecision::Dead);
    }

    #[test]
    fn test_permanent_errors_skip_retries() {
        let job = job_with_failures(0);
        let policy = policy();
        assert_eq!(
            policy.decide(&job, 25, &AppError::Validation("missing name".into())),
            RetryDecision::Dead
        );
        assert_eq!(
            policy.decide(&job, 25, &AppError::UnknownJob("nope".into())),
            RetryDecision::Dead
        );
    }

    #[test]
    fn test_max_below_base_is_raised() {
        let policy = RetryPolicy::new(Duration::from_secs(10), Duration::from_secs(1));
        assert_eq!(policy.backoff_ms(0), 10_000);
        assert_eq!(policy.backoff_ms(3), 10_000);
    }
}

//! Middleware chain around job handlers
//!
//! A middleware wraps the next link of the chain and returns a new handler.
//! Chains are composed right-to-left, so the first middleware in the list is
//! the outermost: it runs first on entry and last on exit. The innermost link
//! is the handler resolved from the registry.
//!
//! The per-job [`JobContext`] is owned and flows inward: a middleware may
//! mutate it before handing it to `next`, and inner links see the change.

use crate::domain::JobRecord;
use crate::error::Result;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

/// Per-execution context handed through the middleware chain
#[derive(Debug, Clone)]
pub struct JobContext {
    pub worker_id: String,
    pub namespace: String,
    /// 1-based attempt number of this execution
    pub attempt: u32,
    /// Set by `TimingMiddleware`
    pub started_at: Option<DateTime<Utc>>,
    values: BTreeMap<String, serde_json::Value>,
}

impl JobContext {
    pub fn new(worker_id: impl Into<String>, namespace: impl Into<String>, attempt: u32) -> Self {
        Self {
            worker_id: worker_id.into(),
            namespace: namespace.into(),
            attempt,
            started_at: None,
            values: BTreeMap::new(),
        }
    }

    /// Attach an enrichment value for inner middleware / the handler
    pub fn insert(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.values.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.values.get(key)
    }
}

/// A link in the chain: takes the record and the context, resolves the attempt
pub type JobHandler =
    Arc<dyn Fn(JobRecord, JobContext) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Lift an async closure into a [`JobHandler`]
pub fn handler_fn<F, Fut>(f: F) -> JobHandler
where
    F: Fn(JobRecord, JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(
        move |job: JobRecord, ctx: JobContext| -> BoxFuture<'static, Result<()>> {
            Box::pin(f(job, ctx))
        },
    )
}

/// Cross-cutting behaviour around handler execution
///
/// Returning from the wrapped handler without calling `next` short-circuits
/// the chain; the middleware's own result becomes the attempt's outcome.
pub trait Middleware: Send + Sync + 'static {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Wrap `next`, producing the handler for this position in the chain
    fn wrap(self: Arc<Self>, next: JobHandler) -> JobHandler;
}

/// Compose `middleware` around `handler`; `middleware[0]` ends up outermost
pub fn compose(middleware: &[Arc<dyn Middleware>], handler: JobHandler) -> JobHandler {
    middleware
        .iter()
        .rev()
        .fold(handler, |next, m| Arc::clone(m).wrap(next))
}

/// Records the start timestamp into the context
#[derive(Debug, Default)]
pub struct TimingMiddleware;

impl Middleware for TimingMiddleware {
    fn name(&self) -> &'static str {
        "timing"
    }

    fn wrap(self: Arc<Self>, next: JobHandler) -> JobHandler {
        Arc::new(
            move |job: JobRecord, mut ctx: JobContext| -> BoxFuture<'static, Result<()>> {
                ctx.started_at = Some(Utc::now());
                next(job, ctx)
            },
        )
    }
}

/// Emits a structured event when a job starts and when it finishes.
///
/// Reads `started_at` from the context, so it belongs after `TimingMiddleware`.
#[derive(Debug, Default)]
pub struct LoggingMiddleware;

impl Middleware for LoggingMiddleware {
    fn name(&self) -> &'static str {
        "logging"
    }

    fn wrap(self: Arc<Self>, next: JobHandler) -> JobHandler {
        Arc::new(
            move |job: JobRecord, ctx: JobContext| -> BoxFuture<'static, Result<()>> {
                let next = Arc::clone(&next);
                Box::pin(async move {
                    let started_at = ctx.started_at.unwrap_or_else(Utc::now);
                    let job_id = job.id.clone();
                    let job_name = job.name.clone();
                    let worker_id = ctx.worker_id.clone();

                    info!(
                        job_id = %job_id,
                        job_name = %job_name,
                        worker_id = %worker_id,
                        attempt = ctx.attempt,
                        started_at = %started_at.to_rfc3339(),
                        "Starting job"
                    );

                    let result = next(job, ctx).await;
                    let elapsed_ms = (Utc::now() - started_at).num_milliseconds();

                    match &result {
                        Ok(()) => info!(
                            job_id = %job_id,
                            job_name = %job_name,
                            worker_id = %worker_id,
                            elapsed_ms,
                            "Job finished"
                        ),
                        Err(e) => warn!(
                            job_id = %job_id,
                            job_name = %job_name,
                            worker_id = %worker_id,
                            elapsed_ms,
                            error = %e,
                            "Job attempt failed"
                        ),
                    }
                    result
                })
            },
        )
    }
}

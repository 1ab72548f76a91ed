//! Job registry: job name -> handler + per-type options
//!
//! Registration happens before the worker pool starts. The pool compiles the
//! registry once into a [`Dispatcher`], wrapping every handler in the
//! middleware chain, and never changes it afterwards.

use crate::application::middleware::{compose, handler_fn, JobContext, JobHandler, Middleware};
use crate::config::DEFAULT_MAX_FAILS;
use crate::domain::{ArgSchema, JobRecord, Priority};
use crate::error::{AppError, Result};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// Per-job-type options
#[derive(Debug, Clone, PartialEq)]
pub struct JobOptions {
    /// Higher runs first
    pub priority: Priority,
    /// Failed attempts before the job is moved to dead-letter (>= 1)
    pub max_fails: u32,
    /// Required arguments, checked at enqueue and again before execution
    pub schema: ArgSchema,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            priority: 0,
            max_fails: DEFAULT_MAX_FAILS,
            schema: ArgSchema::default(),
        }
    }
}

impl JobOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Clamped to at least one attempt
    pub fn max_fails(mut self, max_fails: u32) -> Self {
        self.max_fails = max_fails.max(1);
        self
    }

    pub fn schema(mut self, schema: ArgSchema) -> Self {
        self.schema = schema;
        self
    }
}

#[derive(Clone)]
struct RegisteredJob {
    handler: JobHandler,
    options: JobOptions,
}

/// Mapping from job name to handler
#[derive(Clone, Default)]
pub struct JobRegistry {
    jobs: HashMap<String, RegisteredJob>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` with default options. Re-registering replaces the handler.
    pub fn register<F, Fut>(&mut self, name: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(JobRecord, JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.register_with_options(name, JobOptions::default(), handler)
    }

    pub fn register_with_options<F, Fut>(
        &mut self,
        name: impl Into<String>,
        options: JobOptions,
        handler: F,
    ) -> &mut Self
    where
        F: Fn(JobRecord, JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.jobs.insert(
            name.into(),
            RegisteredJob {
                handler: handler_fn(handler),
                options,
            },
        );
        self
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.jobs.contains_key(name)
    }

    /// Handler and options for `name`, or `UnknownJob`
    pub fn lookup(&self, name: &str) -> Result<(JobHandler, JobOptions)> {
        self.jobs
            .get(name)
            .map(|job| (Arc::clone(&job.handler), job.options.clone()))
            .ok_or_else(|| unknown(name))
    }

    /// Options for `name`, or `UnknownJob`
    pub fn options(&self, name: &str) -> Result<&JobOptions> {
        self.jobs
            .get(name)
            .map(|job| &job.options)
            .ok_or_else(|| unknown(name))
    }

    /// Options of every registered job, for the producer side
    pub fn job_options(&self) -> HashMap<String, JobOptions> {
        self.jobs
            .iter()
            .map(|(name, job)| (name.clone(), job.options.clone()))
            .collect()
    }

    /// Registered names, sorted
    pub fn registered_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.jobs.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Wrap every handler in `middleware` (first entry outermost)
    pub fn compile(&self, middleware: &[Arc<dyn Middleware>]) -> Dispatcher {
        let jobs = self
            .jobs
            .iter()
            .map(|(name, job)| {
                let compiled = CompiledJob {
                    chain: compose(middleware, Arc::clone(&job.handler)),
                    options: job.options.clone(),
                };
                (name.clone(), compiled)
            })
            .collect();

        Dispatcher {
            jobs,
            middleware: middleware.iter().map(|m| m.name()).collect(),
        }
    }
}

/// A registered handler already wrapped in the middleware chain
#[derive(Clone)]
pub struct CompiledJob {
    pub chain: JobHandler,
    pub options: JobOptions,
}

/// Immutable name -> compiled chain lookup shared by all worker units
pub struct Dispatcher {
    jobs: HashMap<String, CompiledJob>,
    middleware: Vec<&'static str>,
}

impl Dispatcher {
    pub fn resolve(&self, name: &str) -> Result<&CompiledJob> {
        self.jobs.get(name).ok_or_else(|| unknown(name))
    }

    /// Middleware names, outermost first
    pub fn middleware(&self) -> &[&'static str] {
        &self.middleware
    }
}

fn unknown(name: &str) -> AppError {
    AppError::UnknownJob(format!("no handler registered for job '{}'", name))
}

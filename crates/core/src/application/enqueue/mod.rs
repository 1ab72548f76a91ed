// Enqueuer - Producer-side API

pub mod request;


pub use request::{validate_request, EnqueueOptions};

use crate::application::registry::JobOptions;
use crate::config::QueueConfig;
use crate::domain::{JobArgs, JobId};
use crate::error::Result;
use crate::port::{IdProvider, QueueStore, TimeProvider};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Submits jobs into one namespace. Cheap to share behind an `Arc`.
pub struct Enqueuer {
    store: Arc<dyn QueueStore>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
    max_fails_default: u32,
    job_options: HashMap<String, JobOptions>,
}

impl Enqueuer {
    pub fn new(
        store: Arc<dyn QueueStore>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
        config: &QueueConfig,
    ) -> Self {
        Self {
            store,
            id_provider,
            time_provider,
            max_fails_default: config.max_fails_default,
            job_options: HashMap::new(),
        }
    }

    /// Per-job-type defaults and argument schemas, usually from
    /// `JobRegistry::job_options` when producer and workers share a process
    pub fn with_job_options(mut self, job_options: HashMap<String, JobOptions>) -> Self {
        self.job_options = job_options;
        self
    }

    pub fn namespace(&self) -> &str {
        self.store.namespace()
    }

    /// Enqueue `name` for immediate execution
    pub async fn enqueue(&self, name: &str, arguments: JobArgs) -> Result<JobId> {
        self.enqueue_with(name, arguments, EnqueueOptions::default())
            .await
    }

    /// Enqueue `name` to become claimable after `delay`
    pub async fn enqueue_in(&self, name: &str, arguments: JobArgs, delay: Duration) -> Result<JobId> {
        self.enqueue_with(name, arguments, EnqueueOptions::default().delay(delay))
            .await
    }

    pub async fn enqueue_with(
        &self,
        name: &str,
        arguments: JobArgs,
        options: EnqueueOptions,
    ) -> Result<JobId> {
        request::execute(
            self.store.as_ref(),
            self.id_provider.as_ref(),
            self.time_provider.as_ref(),
            self.job_options.get(name),
            self.max_fails_default,
            name,
            arguments,
            options,
        )
        .await
    }
}

// Application Layer - Use Cases and Worker Pool

pub mod enqueue;
pub mod middleware;
pub mod recovery;
pub mod registry;
pub mod retry;
pub mod worker;

// Re-exports
pub use enqueue::{EnqueueOptions, Enqueuer};
pub use middleware::{
    compose, handler_fn, JobContext, JobHandler, LoggingMiddleware, Middleware, TimingMiddleware,
};
pub use recovery::Reaper;
pub use registry::{Dispatcher, JobOptions, JobRegistry};
pub use retry::{RetryDecision, RetryPolicy};
pub use worker::{
    shutdown_channel, PoolState, ShutdownSender, ShutdownToken, Worker, WorkerPool, WorkerState,
};

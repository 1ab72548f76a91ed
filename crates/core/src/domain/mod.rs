// Domain Layer - Pure business logic and entities

pub mod args;
pub mod error;
pub mod job;
pub mod queue;

// Re-exports
pub use args::{ArgKind, ArgSchema, ArgValue, JobArgs};
pub use error::DomainError;
pub use job::{JobId, JobRecord, JobState, Priority};
pub use queue::{Namespace, QueueStats};

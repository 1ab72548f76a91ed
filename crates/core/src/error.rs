// Central Error Type for the Application

use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    /// Bad or missing job arguments / malformed request. Never retried.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Transient infrastructure failure (pool exhausted, store I/O, lock contention)
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// No handler registered for the job name. Permanent for this record.
    #[error("Unknown job: {0}")]
    UnknownJob(String),

    /// Handler returned an error or panicked
    #[error("Handler failure: {0}")]
    HandlerFailure(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Shorthand used by job handlers to report a failed attempt
    pub fn handler(msg: impl Into<String>) -> Self {
        AppError::HandlerFailure(msg.into())
    }

    /// Whether a failed attempt with this error may succeed on a later attempt.
    ///
    /// Arguments are immutable and the registry does not change under a running
    /// pool, so `Validation` and `UnknownJob` can never succeed on retry.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, AppError::Validation(_) | AppError::UnknownJob(_))
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

// Note: sqlx::Error conversion is handled in infra-sqlite crate
// by converting to AppError::StoreUnavailable(String)

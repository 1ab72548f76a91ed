// Panic isolation for handler executions
//
// Handlers run on their own tokio task; a panic surfaces as a `JoinError`
// on the worker side instead of unwinding through the worker loop.
use super::constants::UNKNOWN_PANIC_MESSAGE;
use std::any::Any;
use tokio::task::JoinError;
use tracing::error;

/// Best-effort text of a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        UNKNOWN_PANIC_MESSAGE.to_string()
    }
}

/// Turn a failed join of a handler task into the error text recorded on the job
pub fn describe_join_error(job_id: &str, err: JoinError) -> String {
    if err.is_panic() {
        let msg = panic_message(err.into_panic().as_ref());
        error!(job_id = %job_id, panic_msg = %msg, "Job handler panicked");
        format!("panic: {}", msg)
    } else {
        error!(job_id = %job_id, "Job handler task cancelled");
        "handler task cancelled".to_string()
    }
}

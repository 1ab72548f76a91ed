//! Job handlers shipped with the daemon

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tasklane_core::application::{JobContext, JobOptions, JobRegistry};
use tasklane_core::domain::{ArgSchema, JobRecord};
use tasklane_core::error::{AppError, Result};
use tokio::io::AsyncWriteExt;
use tracing::info;

pub const GREETING: &str = "greeting";
pub const EXPORT: &str = "export";

/// Handlers for this daemon. `export` only ever writes below `export_dir`.
pub fn registry(export_dir: PathBuf) -> JobRegistry {
    let export_dir = Arc::new(export_dir);
    let mut registry = JobRegistry::new();
    registry
        .register_with_options(
            GREETING,
            JobOptions::new().schema(ArgSchema::new().require_str("name").require_str("message")),
            greeting,
        )
        .register_with_options(
            EXPORT,
            // Appends are not idempotent, so never retried
            JobOptions::new()
                .priority(10)
                .max_fails(1)
                .schema(ArgSchema::new().require_str("path").require_str("line")),
            move |job, ctx| export(Arc::clone(&export_dir), job, ctx),
        );
    registry
}

async fn greeting(job: JobRecord, ctx: JobContext) -> Result<()> {
    let name = job.arg_str("name")?;
    let message = job.arg_str("message")?;
    info!(job_id = %job.id, worker_id = %ctx.worker_id, "Hello {}, {}", name, message);
    Ok(())
}

/// Resolve `relative` under `root`. Absolute paths, `.` and `..` are rejected.
fn export_target(root: &Path, relative: &str) -> Result<PathBuf> {
    let relative = Path::new(relative);
    let confined = relative.components().next().is_some()
        && relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if !confined {
        return Err(AppError::Validation(format!(
            "export path '{}' must be relative to the export directory",
            relative.display()
        )));
    }
    Ok(root.join(relative))
}

/// Append `line` to `path` inside the export directory
async fn export(export_dir: Arc<PathBuf>, job: JobRecord, _ctx: JobContext) -> Result<()> {
    let target = export_target(&export_dir, job.arg_str("path")?)?;
    let line = job.arg_str("line")?;

    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| AppError::handler(format!("create {}: {}", parent.display(), e)))?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&target)
        .await
        .map_err(|e| AppError::handler(format!("open {}: {}", target.display(), e)))?;
    file.write_all(format!("{}\n", line).as_bytes())
        .await
        .map_err(|e| AppError::handler(format!("write {}: {}", target.display(), e)))?;

    info!(job_id = %job.id, path = %target.display(), "Export appended");
    Ok(())
}

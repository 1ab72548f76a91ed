//! Tasklane SDK - Rust Client Library
//!
//! Producer-side client for the Tasklane daemon's JSON-RPC API.
//!
//! # Example
//!
//! ```no_run
//! use tasklane_sdk::{SubmitRequest, TasklaneClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = TasklaneClient::connect("http://127.0.0.1:9627").await?;
//!
//!     let response = client
//!         .submit(SubmitRequest::new("export").arg("path", "/tmp/out.txt").arg("line", "hello"))
//!         .await?;
//!     println!("Job enqueued: {}", response.job_id);
//!
//!     Ok(())
//! }
//! ```

mod client;
mod error;
mod types;

pub use client::TasklaneClient;
pub use error::{code, Result, SdkError};
pub use types::{Arguments, Job, RetryResponse, Stats, SubmitRequest, SubmitResponse};

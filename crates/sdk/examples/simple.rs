//! Simple SDK Example
//!
//! # Usage
//!
//! 1. Start the daemon:
//!    ```bash
//!    cargo run --package tasklane-daemon
//!    ```
//!
//! 2. Run this example:
//!    ```bash
//!    cargo run --package tasklane-sdk --example simple
//!    ```

use tasklane_sdk::{SubmitRequest, TasklaneClient};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let client = TasklaneClient::connect("http://127.0.0.1:9627").await?;

    // 1. Submit a greeting
    let submitted = client
        .submit(
            SubmitRequest::new("greeting")
                .arg("name", "Dany")
                .arg("message", "How are you?"),
        )
        .await?;
    println!("Submitted {} ({})", submitted.job_id, submitted.state);

    // 2. An empty name is rejected before anything is stored
    match client.submit(SubmitRequest::new("")).await {
        Err(e) if e.is_client_error() => println!("Rejected as expected: {}", e),
        other => println!("Unexpected result: {:?}", other.map(|r| r.job_id)),
    }

    // 3. Give the workers a moment, then look at the queue
    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    match client.get_job(&submitted.job_id).await? {
        Some(job) => println!("Still queued: state={}, fail_count={}", job.state, job.fail_count),
        None => println!("Job {} completed", submitted.job_id),
    }

    let stats = client.stats().await?;
    println!(
        "Namespace {}: pending={} scheduled={} in_flight={} dead={}",
        stats.namespace, stats.pending, stats.scheduled, stats.in_flight, stats.dead
    );

    for job in client.list_dead(Some(10)).await? {
        println!(
            "Dead: {} {} after {} attempts: {}",
            job.id,
            job.name,
            job.fail_count,
            job.last_error.unwrap_or_default()
        );
    }

    Ok(())
}

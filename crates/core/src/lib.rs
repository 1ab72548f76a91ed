// Tasklane Core - Domain Logic, Ports & Worker Pool
// NO infrastructure dependencies: stores are plugged in through `port::QueueStore`

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod port;

pub use config::QueueConfig;
pub use error::{AppError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

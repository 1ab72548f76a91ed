//! JSON-RPC API Layer
//!
//! JSON-RPC 2.0 boundary of the Tasklane daemon: job submission plus
//! dead-letter administration and queue statistics.

pub mod error;
pub mod handler;
pub mod server;
pub mod types;

pub use handler::RpcHandler;
pub use server::{RpcServer, RpcServerConfig};

// Tasklane Infrastructure - SQLite Adapter
// Implements: QueueStore (durable, shared between processes)

mod connection;
mod error;
mod migration;
mod queue_store;

pub use connection::{create_pool, StorePoolConfig};
pub use error::map_sqlx_error;
pub use migration::run_migrations;
pub use queue_store::SqliteQueueStore;

// Note: sqlx::Error conversion is handled by `map_sqlx_error`
// due to Rust's orphan rules (cannot implement From<sqlx::Error> for AppError here)

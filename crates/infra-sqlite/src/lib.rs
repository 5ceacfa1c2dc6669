// Courier Infrastructure - SQLite Adapter
// Implements: JobStore, DeadLetterStore, LockStore

mod connection;
mod dead_letter_store;
mod error;
mod job_store;
mod lock_store;
mod migration;

pub use connection::{create_pool, is_memory_url};
pub use dead_letter_store::SqliteDeadLetterStore;
pub use error::map_sqlx_error;
pub use job_store::SqliteJobStore;
pub use lock_store::SqliteLockStore;
pub use migration::{current_version, run_migrations, LATEST_VERSION};

// Note: sqlx::Error conversion is done by `map_sqlx_error`
// due to Rust's orphan rules (cannot implement From<sqlx::Error> for AppError here)

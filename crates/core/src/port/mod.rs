// Port Layer - Interfaces for external dependencies

pub mod dead_letter_store;
pub mod id_provider; // For deterministic testing
pub mod job_handler;
pub mod job_store;
pub mod lock_store;
pub mod memory;
pub mod time_provider;

// Re-exports
pub use dead_letter_store::{DeadLetterStore, DEFAULT_REASON_QUERY_LIMIT};
pub use id_provider::IdProvider;
pub use job_handler::{handler_fn, FnHandler, JobContext, JobHandler, JobMetadata, JobOutcome};
pub use job_store::{ClaimRequest, JobStore};
pub use lock_store::LockStore;
pub use memory::InMemoryStore;
pub use time_provider::TimeProvider;

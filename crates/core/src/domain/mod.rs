// Domain Layer - Pure business logic and entities

pub mod dead_letter;
pub mod error;
pub mod job;
pub mod lock;
pub mod queue;

// Re-exports
pub use dead_letter::{DeadLetterEntry, DeadLetterId, ReasonCount, UNKNOWN_JOB_TYPE_REASON};
pub use error::DomainError;
pub use job::{Job, JobId, JobPayload, JobStatus, JobType, Priority, DEFAULT_MAX_ATTEMPTS};
pub use lock::{ConcurrencyLock, LockAcquisition, LockScope};
pub use queue::{QueueId, QueueStats, DEFAULT_QUEUE};

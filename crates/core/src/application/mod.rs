// Application Layer - Use Cases and Business Logic

pub mod batch_loader;
pub mod handlers;
pub mod maintenance;
pub mod queue_manager;
pub mod recovery;
pub mod retry;
pub mod worker;

// Re-exports
pub use batch_loader::{BatchLoad, BatchLoader};
pub use handlers::HandlerRegistry;
pub use maintenance::{MaintenanceConfig, MaintenanceReport, MaintenanceScheduler};
pub use queue_manager::{EnqueueOptions, EnqueueRequest, QueueManager, ReprocessOutcome};
pub use recovery::RecoveryService;
pub use retry::{BackoffConfig, RetryDecision, RetryPolicy};
pub use worker::{
    shutdown_channel, BatchReport, PollOutcome, Settlement, ShutdownSender, ShutdownToken, Worker,
    WorkerConfig,
};

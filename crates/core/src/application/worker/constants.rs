// Worker constants (no magic values)
use std::time::Duration;

/// Sleep after a failed poll before trying again
pub const ERROR_RECOVERY_SLEEP_DURATION: Duration = Duration::from_secs(1);

/// Lease on the queue-partition lock held across one claim statement
pub const PARTITION_LOCK_LEASE_MS: i64 = 10_000;

/// Settlement writes retried this many times on transient store errors
pub const SETTLE_MAX_RETRIES: u32 = 3;

/// First settlement retry delay, doubled on each further try
pub const SETTLE_RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

/// Failure reason when a handler exceeds its time-box
pub const HANDLER_TIMEOUT_REASON: &str = "handler timed out";

/// Failure reason when a handler task is cancelled from outside
pub const HANDLER_CANCELLED_REASON: &str = "handler cancelled";

// Defaults for WorkerConfig
pub const DEFAULT_CONCURRENCY: usize = 5;
pub const DEFAULT_BATCH_SIZE: i64 = 50;
pub const DEFAULT_PROCESSING_INTERVAL_MS: u64 = 5_000;
pub const DEFAULT_LEASE_DURATION_MS: i64 = 30_000;
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 10_000;
pub const DEFAULT_HANDLER_TIMEOUT_MS: u64 = 5 * 60 * 1_000;
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 30_000;

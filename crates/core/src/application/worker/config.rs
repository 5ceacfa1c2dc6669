// Worker configuration

use super::constants::*;
use crate::application::queue_manager::validate_queue_name;
use crate::domain::DEFAULT_QUEUE;
use crate::error::{AppError, Result};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub queue_name: String,
    /// Jobs executed at the same time
    pub concurrency: usize,
    /// Jobs claimed per poll
    pub batch_size: i64,
    /// Idle sleep after an empty or contended poll
    pub processing_interval_ms: u64,
    pub lease_duration_ms: i64,
    pub heartbeat_interval_ms: u64,
    pub handler_timeout_ms: u64,
    /// Grace period for in-flight jobs once shutdown is requested
    pub shutdown_timeout_ms: u64,
    /// Take the `queue:<name>` lock around each claim
    pub partition_lock: bool,
    /// Lease owner identity; generated when absent
    pub worker_id: Option<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue_name: DEFAULT_QUEUE.to_string(),
            concurrency: DEFAULT_CONCURRENCY,
            batch_size: DEFAULT_BATCH_SIZE,
            processing_interval_ms: DEFAULT_PROCESSING_INTERVAL_MS,
            lease_duration_ms: DEFAULT_LEASE_DURATION_MS,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            handler_timeout_ms: DEFAULT_HANDLER_TIMEOUT_MS,
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
            partition_lock: true,
            worker_id: None,
        }
    }
}

impl WorkerConfig {
    pub fn validate(&self) -> Result<()> {
        validate_queue_name(&self.queue_name)
            .map_err(|e| AppError::Config(format!("queue_name: {}", e)))?;

        if self.concurrency == 0 {
            return Err(AppError::Config("concurrency must be at least 1".to_string()));
        }
        if self.batch_size < 1 {
            return Err(AppError::Config("batch_size must be at least 1".to_string()));
        }
        if self.processing_interval_ms == 0 {
            return Err(AppError::Config(
                "processing_interval_ms must be positive".to_string(),
            ));
        }
        if self.lease_duration_ms <= 0 {
            return Err(AppError::Config("lease_duration_ms must be positive".to_string()));
        }
        // A heartbeat slower than the lease lets healthy jobs be reclaimed
        if self.heartbeat_interval_ms == 0
            || self.heartbeat_interval_ms as i64 >= self.lease_duration_ms
        {
            return Err(AppError::Config(format!(
                "heartbeat_interval_ms ({}) must be positive and below lease_duration_ms ({})",
                self.heartbeat_interval_ms, self.lease_duration_ms
            )));
        }
        if self.handler_timeout_ms == 0 {
            return Err(AppError::Config("handler_timeout_ms must be positive".to_string()));
        }
        if matches!(&self.worker_id, Some(id) if id.trim().is_empty()) {
            return Err(AppError::Config("worker_id must not be blank".to_string()));
        }
        Ok(())
    }

    pub fn processing_interval(&self) -> Duration {
        Duration::from_millis(self.processing_interval_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn handler_timeout(&self) -> Duration {
        Duration::from_millis(self.handler_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = WorkerConfig::default();
        tokio_test::assert_ok!(config.validate());
        assert_eq!(config.queue_name, "app-queue");
        assert_eq!(config.concurrency, 5);
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.processing_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_heartbeat_must_beat_lease() {
        let config = WorkerConfig {
            lease_duration_ms: 1_000,
            heartbeat_interval_ms: 1_000,
            ..WorkerConfig::default()
        };
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn test_rejects_zero_concurrency_and_bad_queue() {
        let config = WorkerConfig {
            concurrency: 0,
            ..WorkerConfig::default()
        };
        assert!(config.validate().is_err());

        let config = WorkerConfig {
            queue_name: "bad queue!".into(),
            ..WorkerConfig::default()
        };
        assert!(config.validate().unwrap_err().to_string().contains("queue_name"));
    }

    #[test]
    fn test_partial_deserialize_keeps_defaults() {
        let config: WorkerConfig =
            serde_json::from_value(serde_json::json!({"concurrency": 2, "queue_name": "mail"}))
                .unwrap();
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.queue_name, "mail");
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert!(config.partition_lock);
    }
}

//! Process configuration, read from `COURIER_*` environment variables

use anyhow::{Context, Result};
use courier_core::application::{BackoffConfig, MaintenanceConfig, WorkerConfig};
use courier_core::domain::DEFAULT_QUEUE;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

const ENV_PREFIX: &str = "COURIER";
const DEFAULT_DB_PATH: &str = "~/.courier/queue.db";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Everything the worker process needs, flat so each field maps to one
/// `COURIER_<FIELD>` variable. Backoff tuning nests as `COURIER_BACKOFF__<FIELD>`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub queue_name: String,
    pub concurrency: usize,
    pub batch_size: i64,
    pub processing_interval_ms: u64,
    pub lease_duration_ms: i64,
    pub heartbeat_interval_ms: u64,
    pub handler_timeout_ms: u64,
    pub shutdown_timeout_ms: u64,
    pub partition_lock: bool,
    pub worker_id: Option<String>,

    pub db_path: String,
    pub dlq_retention_days: i64,
    pub job_retention_days: i64,
    pub maintenance_interval_hours: u64,
    pub log_format: LogFormat,
    pub backoff: BackoffConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        let worker = WorkerConfig::default();
        let maintenance = MaintenanceConfig::default();
        Self {
            queue_name: DEFAULT_QUEUE.to_string(),
            concurrency: worker.concurrency,
            batch_size: worker.batch_size,
            processing_interval_ms: worker.processing_interval_ms,
            lease_duration_ms: worker.lease_duration_ms,
            heartbeat_interval_ms: worker.heartbeat_interval_ms,
            handler_timeout_ms: worker.handler_timeout_ms,
            shutdown_timeout_ms: worker.shutdown_timeout_ms,
            partition_lock: worker.partition_lock,
            worker_id: None,
            db_path: DEFAULT_DB_PATH.to_string(),
            dlq_retention_days: maintenance.dlq_retention_days,
            job_retention_days: maintenance.job_retention_days,
            maintenance_interval_hours: maintenance.interval.as_secs() / 3600,
            log_format: LogFormat::Pretty,
            backoff: BackoffConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// Load from the process environment
    pub fn load() -> Result<Self> {
        Self::from_environment(environment())
    }

    fn from_environment(source: config::Environment) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(source)
            .build()
            .context("failed to read configuration")?
            .try_deserialize::<Self>()
            .context("invalid configuration")?;

        settings.worker_config().validate()?;
        if settings.maintenance_interval_hours == 0 {
            anyhow::bail!("maintenance_interval_hours must be positive");
        }
        Ok(settings)
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            queue_name: self.queue_name.clone(),
            concurrency: self.concurrency,
            batch_size: self.batch_size,
            processing_interval_ms: self.processing_interval_ms,
            lease_duration_ms: self.lease_duration_ms,
            heartbeat_interval_ms: self.heartbeat_interval_ms,
            handler_timeout_ms: self.handler_timeout_ms,
            shutdown_timeout_ms: self.shutdown_timeout_ms,
            partition_lock: self.partition_lock,
            worker_id: self.worker_id.clone(),
        }
    }

    pub fn maintenance_config(&self) -> MaintenanceConfig {
        MaintenanceConfig {
            dlq_retention_days: self.dlq_retention_days,
            job_retention_days: self.job_retention_days,
            interval: Duration::from_secs(self.maintenance_interval_hours * 3600),
        }
    }

    /// `db_path` with `~` expanded
    pub fn expanded_db_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.db_path).into_owned())
    }

    /// sqlx connection URL for `db_path`
    pub fn database_url(&self) -> String {
        if self.db_path == ":memory:" {
            return "sqlite::memory:".to_string();
        }
        format!("sqlite://{}", self.expanded_db_path().display())
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

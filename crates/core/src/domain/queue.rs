// Queue Domain Model

use crate::domain::job::JobStatus;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Queue identifier
pub type QueueId = String;

/// Queue name used when neither the producer nor the worker names one
pub const DEFAULT_QUEUE: &str = "app-queue";

/// Snapshot of a queue for health/observability reporting
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: i64,
    pub claimed: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
    pub dead_lettered: i64,
}

impl QueueStats {
    /// Build from per-status counts plus the DLQ size
    pub fn from_counts(counts: &HashMap<JobStatus, i64>, dead_lettered: i64) -> Self {
        let get = |status: JobStatus| counts.get(&status).copied().unwrap_or(0);
        Self {
            pending: get(JobStatus::Pending),
            claimed: get(JobStatus::Claimed),
            processing: get(JobStatus::Processing),
            completed: get(JobStatus::Completed),
            failed: get(JobStatus::Failed),
            dead_lettered,
        }
    }

    /// Jobs that still need a worker (waiting or in flight)
    pub fn outstanding(&self) -> i64 {
        self.pending + self.claimed + self.processing
    }
}

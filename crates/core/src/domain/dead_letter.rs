// Dead Letter Queue Domain Model

use crate::domain::job::{Job, JobId, JobPayload, JobType, Priority};
use serde::{Deserialize, Serialize};

pub type DeadLetterId = String;

/// Reason recorded when no handler is registered for a job type
pub const UNKNOWN_JOB_TYPE_REASON: &str = "unknown job type";

/// A job exiled from the queue after exhausting retries or failing terminally.
///
/// Immutable once written, except for `reprocessed` / `reprocessed_at`,
/// which flip exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub id: DeadLetterId,
    pub job_id: JobId,
    pub original_job_id: JobId,
    pub queue: String,
    pub job_type: JobType,
    pub payload: JobPayload,
    pub reason: String,
    pub failed_at: i64,
    pub attempt: i32,
    pub max_attempts: i32,
    pub priority: Priority,
    pub reprocessed: bool,
    pub reprocessed_at: Option<i64>,
}

impl DeadLetterEntry {
    /// Build the entry for a job that has just been settled as failed
    pub fn from_job(id: impl Into<String>, job: &Job, reason: impl Into<String>, failed_at: i64) -> Self {
        Self {
            id: id.into(),
            job_id: job.id.clone(),
            original_job_id: job.lineage_root().to_string(),
            queue: job.queue.clone(),
            job_type: job.job_type.clone(),
            payload: job.payload.clone(),
            reason: reason.into(),
            failed_at,
            attempt: job.attempt,
            max_attempts: job.max_attempts,
            priority: job.priority,
            reprocessed: false,
            reprocessed_at: None,
        }
    }
}

/// Number of DLQ entries sharing a reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasonCount {
    pub reason: String,
    pub count: i64,
}

impl ReasonCount {
    pub fn new(reason: impl Into<String>, count: i64) -> Self {
        Self {
            reason: reason.into(),
            count,
        }
    }
}

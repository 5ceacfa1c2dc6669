// Job Domain Model

use crate::domain::error::DomainError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Job ID (UUID v4)
pub type JobId = String;

/// Priority (higher number = claimed sooner)
pub type Priority = i32;

/// Retry budget applied when the producer does not set one
pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

/// Job Status
///
/// `Claimed` and `Processing` are the leased states: the job carries
/// `locked_by` / `locked_until` and belongs to exactly one worker until the
/// lease runs out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Claimed,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Pending,
        JobStatus::Claimed,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Claimed => "claimed",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Status owned by a worker lease
    pub fn is_leased(&self) -> bool {
        matches!(self, JobStatus::Claimed | JobStatus::Processing)
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "claimed" => Ok(JobStatus::Claimed),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(DomainError::UnknownStatus(other.to_string())),
        }
    }
}

/// Job Type: the key a handler is registered under
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobType(String);

impl JobType {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobType {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Job Payload (opaque JSON, interpreted only by the handler)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPayload(serde_json::Value);

impl JobPayload {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_value(self) -> serde_json::Value {
        self.0
    }
}

/// Job Entity
///
/// All timestamps are epoch milliseconds taken from the injected `TimeProvider`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub queue: String,
    pub job_type: JobType,
    pub payload: JobPayload,

    pub status: JobStatus,
    /// Number of failed executions so far
    pub attempt: i32,
    pub max_attempts: i32,
    pub priority: Priority,
    /// Not eligible for claiming before this instant
    pub available_at: i64,

    // Lease
    pub locked_by: Option<String>,
    pub locked_until: Option<i64>,

    pub created_at: i64,
    pub updated_at: i64,
    pub last_error: Option<String>,

    /// Lineage root when this job was re-enqueued from the DLQ
    pub original_job_id: Option<JobId>,
}

impl Job {
    /// Create a test job with deterministic ID and timestamp.
    ///
    /// Uses a simple counter for deterministic test IDs (test-1, test-2, ...).
    /// Timestamps start at 1000 and increment by 1000.
    ///
    /// **Note**: This method should only be used in tests. For production code,
    /// always inject ID and time via providers.
    pub fn new_test(queue: impl Into<String>, job_type: JobType, payload: JobPayload) -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static TEST_COUNTER: AtomicU64 = AtomicU64::new(1);

        let counter = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let id = format!("test-{}", counter);
        let created_at = (counter * 1000) as i64;

        Self::new(id, created_at, queue, job_type, payload)
    }

    /// Create a new pending job
    ///
    /// # Arguments
    ///
    /// * `id` - Unique job ID (injected, not generated)
    /// * `created_at` - Creation timestamp in epoch ms (injected, not system time)
    /// * `queue` - Queue name
    /// * `job_type` - Handler key
    /// * `payload` - Job payload
    pub fn new(
        id: impl Into<String>,
        created_at: i64,
        queue: impl Into<String>,
        job_type: JobType,
        payload: JobPayload,
    ) -> Self {
        Self {
            id: id.into(),
            queue: queue.into(),
            job_type,
            payload,
            status: JobStatus::Pending,
            attempt: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            priority: 0,
            available_at: created_at,
            locked_by: None,
            locked_until: None,
            created_at,
            updated_at: created_at,
            last_error: None,
            original_job_id: None,
        }
    }

    /// Root of the reprocessing chain this job belongs to
    pub fn lineage_root(&self) -> &str {
        self.original_job_id.as_deref().unwrap_or(&self.id)
    }

    /// Worker currently holding the lease, if any
    pub fn lease_owner(&self) -> crate::domain::error::Result<&str> {
        self.locked_by
            .as_deref()
            .ok_or_else(|| DomainError::NotLeased(self.id.clone()))
    }

    /// True when another worker may take this job over at `now`
    pub fn is_claimable(&self, now_millis: i64) -> bool {
        match self.status {
            JobStatus::Pending => self.available_at <= now_millis,
            JobStatus::Claimed | JobStatus::Processing => self
                .locked_until
                .map(|until| until < now_millis)
                .unwrap_or(true),
            JobStatus::Completed | JobStatus::Failed => false,
        }
    }

    /// True when one more failure exhausts the retry budget
    pub fn is_last_attempt(&self) -> bool {
        self.attempt + 1 >= self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn job() -> Job {
        Job::new(
            "job-1",
            10_000,
            "app-queue",
            JobType::new("email.send"),
            JobPayload::new(json!({"to": "a@example.com"})),
        )
    }

    #[test]
    fn test_new_job_defaults() {
        let job = job();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempt, 0);
        assert_eq!(job.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert_eq!(job.available_at, 10_000);
        assert!(job.locked_by.is_none());
        assert_eq!(job.lineage_root(), "job-1");
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in JobStatus::ALL {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("RUNNING".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_claimable_respects_available_at_and_lease() {
        let mut job = job();
        job.available_at = 20_000;
        assert!(!job.is_claimable(15_000));
        assert!(job.is_claimable(20_000));

        job.status = JobStatus::Claimed;
        job.locked_by = Some("worker-a".into());
        job.locked_until = Some(30_000);
        assert!(!job.is_claimable(29_999));
        assert!(job.is_claimable(30_001));

        job.status = JobStatus::Completed;
        assert!(!job.is_claimable(i64::MAX));
    }

    #[test]
    fn test_lease_owner_requires_lock() {
        let mut job = job();
        assert!(job.lease_owner().is_err());
        job.locked_by = Some("worker-a".into());
        assert_eq!(job.lease_owner().unwrap(), "worker-a");
    }

    #[test]
    fn test_last_attempt() {
        let mut job = job();
        job.max_attempts = 3;
        job.attempt = 1;
        assert!(!job.is_last_attempt());
        job.attempt = 2;
        assert!(job.is_last_attempt());
    }
}

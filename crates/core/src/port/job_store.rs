// Job Store Port (Interface)

use crate::domain::{Job, JobId, JobStatus};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;

/// Parameters of one batch claim
#[derive(Debug, Clone)]
pub struct ClaimRequest {
    pub queue: String,
    /// Worker taking the lease
    pub owner: String,
    pub limit: i64,
    pub now: i64,
    pub lease_ms: i64,
}

/// Persistence contract for job documents.
///
/// Every mutation of a leased job is fenced on `locked_by = owner` and a
/// leased status. The boolean results report whether the write applied:
/// `false` means the lease was lost (expired and reclaimed elsewhere) and the
/// caller's residual write was rejected. That is an expected outcome, not an error.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Create collections/indexes (idempotent)
    async fn initialize(&self) -> Result<()>;

    /// Insert a new job
    async fn insert(&self, job: &Job) -> Result<()>;

    /// Find job by ID
    async fn find_by_id(&self, id: &JobId) -> Result<Option<Job>>;

    /// Atomically claim up to `limit` eligible jobs.
    ///
    /// Eligible: `pending` with `available_at <= now`, or leased with an
    /// expired `locked_until`. Ordered `priority DESC, available_at ASC`.
    /// Each returned job is `claimed` by `owner` until `now + lease_ms`.
    async fn claim_batch(&self, request: &ClaimRequest) -> Result<Vec<Job>>;

    /// claimed -> processing, renewing the lease to `locked_until`.
    ///
    /// A lease that already expired is not revived: it may be claimed by
    /// another worker at any moment, so the call reports `false`.
    async fn mark_processing(&self, id: &JobId, owner: &str, locked_until: i64) -> Result<bool>;

    /// Heartbeat: push `locked_until` forward while the owner still holds the lease
    async fn extend_lease(&self, id: &JobId, owner: &str, locked_until: i64) -> Result<bool>;

    /// Leased -> completed, lease cleared
    async fn settle_complete(&self, id: &JobId, owner: &str) -> Result<bool>;

    /// Leased -> pending with `attempt + 1`, available again at `available_at`
    async fn settle_retry(
        &self,
        id: &JobId,
        owner: &str,
        available_at: i64,
        error: &str,
    ) -> Result<bool>;

    /// Leased -> failed with `attempt + 1`; returns the final document for DLQ insertion.
    ///
    /// Repeatable by the same owner: a job this owner already failed is
    /// returned unchanged, so a DLQ insert that failed afterwards can be retried.
    async fn settle_failed(&self, id: &JobId, owner: &str, error: &str) -> Result<Option<Job>>;

    /// Reset leased jobs whose `locked_until < now` back to pending (crash recovery)
    async fn reclaim_expired(&self, now: i64) -> Result<u64>;

    /// Count jobs per status in a queue
    async fn count_by_status(&self, queue: &str) -> Result<HashMap<JobStatus, i64>>;

    /// Delete completed/failed jobs last updated before `finished_before`
    async fn purge_finished(&self, finished_before: i64) -> Result<u64>;

    /// Remove every job (test teardown)
    async fn clear(&self) -> Result<()>;
}

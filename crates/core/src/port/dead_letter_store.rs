// Dead Letter Queue Store Port

use crate::domain::{DeadLetterEntry, DeadLetterId, JobId, ReasonCount};
use crate::error::Result;
use async_trait::async_trait;

/// Default page size for `find_by_reason`
pub const DEFAULT_REASON_QUERY_LIMIT: i64 = 50;

/// Persistence contract for failed-job records
#[async_trait]
pub trait DeadLetterStore: Send + Sync {
    /// Create collections/indexes (idempotent)
    async fn initialize(&self) -> Result<()>;

    /// Insert an entry.
    ///
    /// # Returns
    /// `false` if an entry for the same `job_id` already exists (nothing written)
    async fn insert(&self, entry: &DeadLetterEntry) -> Result<bool>;

    async fn find_by_id(&self, id: &DeadLetterId) -> Result<Option<DeadLetterEntry>>;

    async fn find_by_job_id(&self, job_id: &JobId) -> Result<Option<DeadLetterEntry>>;

    /// Every entry of a reprocessing chain, oldest first
    async fn find_by_original_job_id(&self, original_job_id: &JobId) -> Result<Vec<DeadLetterEntry>>;

    /// Most recent failures first, paged
    async fn find_recent_failures_page(&self, limit: i64, offset: i64) -> Result<Vec<DeadLetterEntry>>;

    /// Most recent failures first
    async fn find_recent_failures(&self, limit: i64) -> Result<Vec<DeadLetterEntry>> {
        self.find_recent_failures_page(limit, 0).await
    }

    /// Entries with exactly this reason, most recent first.
    /// `limit` defaults to [`DEFAULT_REASON_QUERY_LIMIT`].
    async fn find_by_reason(&self, reason: &str, limit: Option<i64>) -> Result<Vec<DeadLetterEntry>>;

    /// Set `reprocessed = true, reprocessed_at = now` once.
    ///
    /// Idempotent: a second call leaves `reprocessed_at` untouched.
    /// # Returns
    /// The entry after the call, or `None` if it does not exist
    async fn mark_as_reprocessed(&self, id: &DeadLetterId) -> Result<Option<DeadLetterEntry>>;

    /// Counts grouped by reason, largest first (ties by reason)
    async fn get_stats_by_reason(&self) -> Result<Vec<ReasonCount>>;

    /// Delete entries older than `older_than_days` that were never reprocessed.
    ///
    /// Reprocessed entries are kept as the record of a resolved incident.
    /// # Returns
    /// Number of deleted entries
    async fn cleanup_old_entries(&self, older_than_days: i64) -> Result<u64>;

    async fn count(&self) -> Result<i64>;

    /// Remove every entry (test teardown)
    async fn clear(&self) -> Result<()>;
}

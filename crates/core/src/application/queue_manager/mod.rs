// Queue Manager
// Single entry point over the job, DLQ and lock stores. The only writer of DLQ entries.

pub mod enqueue;

pub use enqueue::{validate_queue_name, validate_request, EnqueueOptions, EnqueueRequest};

use crate::domain::{
    ConcurrencyLock, DeadLetterEntry, DeadLetterId, Job, JobId, LockAcquisition, LockScope,
    QueueStats, ReasonCount,
};
use crate::error::Result;
use crate::port::{ClaimRequest, DeadLetterStore, IdProvider, JobStore, LockStore, TimeProvider};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

/// Result of reprocessing a DLQ entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReprocessOutcome {
    /// A fresh job was enqueued
    Requeued { job_id: JobId },
    /// The entry was reprocessed before; nothing enqueued
    AlreadyReprocessed,
    NotFound,
}

pub struct QueueManager {
    job_store: Arc<dyn JobStore>,
    dlq_store: Arc<dyn DeadLetterStore>,
    lock_store: Arc<dyn LockStore>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
    default_queue: String,
    initialized: OnceCell<()>,
}

impl QueueManager {
    pub fn new(
        job_store: Arc<dyn JobStore>,
        dlq_store: Arc<dyn DeadLetterStore>,
        lock_store: Arc<dyn LockStore>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            job_store,
            dlq_store,
            lock_store,
            id_provider,
            time_provider,
            default_queue: crate::domain::DEFAULT_QUEUE.to_string(),
            initialized: OnceCell::new(),
        }
    }

    /// Queue used by `enqueue` when the options name none
    pub fn with_default_queue(mut self, queue: impl Into<String>) -> Self {
        self.default_queue = queue.into();
        self
    }

    pub fn default_queue(&self) -> &str {
        &self.default_queue
    }

    pub fn now_millis(&self) -> i64 {
        self.time_provider.now_millis()
    }

    pub fn id_provider(&self) -> &Arc<dyn IdProvider> {
        &self.id_provider
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Create tables and indexes. Runs once per manager; later calls are no-ops.
    pub async fn initialize(&self) -> Result<()> {
        self.initialized
            .get_or_try_init(|| async {
                self.job_store.initialize().await?;
                self.dlq_store.initialize().await?;
                self.lock_store.initialize().await?;
                info!("Queue stores initialized");
                Ok::<(), crate::error::AppError>(())
            })
            .await?;
        Ok(())
    }

    /// Drop every job, DLQ entry and lock (test isolation)
    pub async fn reset(&self) -> Result<()> {
        self.job_store.clear().await?;
        self.dlq_store.clear().await?;
        self.lock_store.clear().await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Jobs
    // ------------------------------------------------------------------

    pub async fn enqueue(
        &self,
        job_type: impl Into<String>,
        payload: serde_json::Value,
        options: EnqueueOptions,
    ) -> Result<JobId> {
        self.enqueue_request(EnqueueRequest::new(job_type, payload).with_options(options))
            .await
    }

    pub async fn enqueue_request(&self, req: EnqueueRequest) -> Result<JobId> {
        enqueue::execute(
            self.job_store.as_ref(),
            self.id_provider.as_ref(),
            self.time_provider.as_ref(),
            &self.default_queue,
            req,
        )
        .await
    }

    pub async fn job(&self, id: &JobId) -> Result<Option<Job>> {
        self.job_store.find_by_id(id).await
    }

    /// Status counts for `queue` (default queue when `None`).
    /// `dead_lettered` counts DLQ entries across all queues.
    pub async fn get_stats(&self, queue: Option<&str>) -> Result<QueueStats> {
        let queue = queue.unwrap_or(&self.default_queue);
        let counts = self.job_store.count_by_status(queue).await?;
        let dead_lettered = self.dlq_store.count().await?;
        Ok(QueueStats::from_counts(&counts, dead_lettered))
    }

    /// Claim up to `limit` due jobs for `owner`, leased for `lease_ms`
    pub async fn claim_batch(
        &self,
        queue: &str,
        owner: &str,
        limit: i64,
        lease_ms: i64,
    ) -> Result<Vec<Job>> {
        let request = ClaimRequest {
            queue: queue.to_string(),
            owner: owner.to_string(),
            limit,
            now: self.now_millis(),
            lease_ms,
        };
        self.job_store.claim_batch(&request).await
    }

    /// Start execution and renew the lease for `lease_ms`. `false` means the
    /// claim expired before execution could start.
    pub async fn mark_processing(&self, job: &Job, lease_ms: i64) -> Result<bool> {
        let locked_until = self.now_millis() + lease_ms;
        self.job_store
            .mark_processing(&job.id, job.lease_owner()?, locked_until)
            .await
    }

    /// Heartbeat: keep the lease alive for another `lease_ms`
    pub async fn extend_lease(&self, job: &Job, lease_ms: i64) -> Result<bool> {
        let locked_until = self.now_millis() + lease_ms;
        self.job_store
            .extend_lease(&job.id, job.lease_owner()?, locked_until)
            .await
    }

    /// Settle a successful execution. `false` means the lease was lost.
    pub async fn complete(&self, job: &Job) -> Result<bool> {
        let applied = self.job_store.settle_complete(&job.id, job.lease_owner()?).await?;
        if applied {
            info!(job_id = %job.id, attempt = job.attempt + 1, "Job completed");
        } else {
            warn!(job_id = %job.id, "Lease lost before completion, result dropped");
        }
        Ok(applied)
    }

    /// Put a failed job back to pending, eligible again after `delay_ms`
    pub async fn retry(&self, job: &Job, delay_ms: i64, error: &str) -> Result<bool> {
        let available_at = self.now_millis() + delay_ms;
        let applied = self
            .job_store
            .settle_retry(&job.id, job.lease_owner()?, available_at, error)
            .await?;
        if !applied {
            warn!(job_id = %job.id, "Lease lost before retry settlement");
        }
        Ok(applied)
    }

    /// Mark the job failed and record it in the DLQ.
    ///
    /// Safe to call again after a failed DLQ insert: the job is already
    /// failed by this owner, and the entry is written on the next call.
    ///
    /// # Returns
    /// The DLQ entry, or `None` if the lease was lost (the job belongs to
    /// another worker now and nothing is written)
    pub async fn move_to_dlq(&self, job: &Job, reason: &str) -> Result<Option<DeadLetterEntry>> {
        let Some(failed) = self
            .job_store
            .settle_failed(&job.id, job.lease_owner()?, reason)
            .await?
        else {
            warn!(job_id = %job.id, "Lease lost before DLQ settlement");
            return Ok(None);
        };

        let entry = DeadLetterEntry::from_job(
            self.id_provider.generate_id(),
            &failed,
            reason,
            self.now_millis(),
        );

        if self.dlq_store.insert(&entry).await? {
            warn!(
                job_id = %failed.id,
                dlq_id = %entry.id,
                attempt = failed.attempt,
                max_attempts = failed.max_attempts,
                reason = %reason,
                "Job moved to DLQ"
            );
            return Ok(Some(entry));
        }

        // An earlier try wrote the entry before its error surfaced: keep that one
        self.dlq_store.find_by_job_id(&failed.id).await
    }

    /// Reset jobs with an expired lease back to pending
    pub async fn reclaim_expired(&self) -> Result<u64> {
        self.job_store.reclaim_expired(self.now_millis()).await
    }

    /// Delete completed/failed jobs older than `older_than_ms`
    pub async fn purge_finished(&self, older_than_ms: i64) -> Result<u64> {
        self.job_store
            .purge_finished(self.now_millis() - older_than_ms)
            .await
    }

    // ------------------------------------------------------------------
    // Dead Letter Queue
    // ------------------------------------------------------------------

    /// Re-enqueue a DLQ entry as a fresh job in the same lineage
    pub async fn reprocess(&self, dlq_id: &DeadLetterId) -> Result<ReprocessOutcome> {
        let Some(entry) = self.dlq_store.find_by_id(dlq_id).await? else {
            return Ok(ReprocessOutcome::NotFound);
        };

        if entry.reprocessed {
            info!(dlq_id = %entry.id, "DLQ entry already reprocessed");
            return Ok(ReprocessOutcome::AlreadyReprocessed);
        }

        let req = EnqueueRequest {
            job_type: entry.job_type.to_string(),
            payload: entry.payload.clone().into_value(),
            options: EnqueueOptions {
                queue: Some(entry.queue.clone()),
                priority: entry.priority,
                max_attempts: Some(entry.max_attempts),
                delay_ms: 0,
            },
            original_job_id: Some(entry.original_job_id.clone()),
        };
        let job_id = self.enqueue_request(req).await?;
        self.dlq_store.mark_as_reprocessed(&entry.id).await?;

        info!(
            dlq_id = %entry.id,
            job_id = %job_id,
            original_job_id = %entry.original_job_id,
            "DLQ entry reprocessed"
        );

        Ok(ReprocessOutcome::Requeued { job_id })
    }

    pub async fn dlq_entry(&self, id: &DeadLetterId) -> Result<Option<DeadLetterEntry>> {
        self.dlq_store.find_by_id(id).await
    }

    pub async fn dlq_entry_for_job(&self, job_id: &JobId) -> Result<Option<DeadLetterEntry>> {
        self.dlq_store.find_by_job_id(job_id).await
    }

    /// Every DLQ entry of a lineage, oldest first
    pub async fn dlq_lineage(&self, original_job_id: &JobId) -> Result<Vec<DeadLetterEntry>> {
        self.dlq_store.find_by_original_job_id(original_job_id).await
    }

    pub async fn recent_failures(&self, limit: i64, offset: i64) -> Result<Vec<DeadLetterEntry>> {
        self.dlq_store.find_recent_failures_page(limit, offset).await
    }

    pub async fn failures_by_reason(
        &self,
        reason: &str,
        limit: Option<i64>,
    ) -> Result<Vec<DeadLetterEntry>> {
        self.dlq_store.find_by_reason(reason, limit).await
    }

    pub async fn dlq_stats_by_reason(&self) -> Result<Vec<ReasonCount>> {
        self.dlq_store.get_stats_by_reason().await
    }

    pub async fn mark_as_reprocessed(&self, id: &DeadLetterId) -> Result<Option<DeadLetterEntry>> {
        self.dlq_store.mark_as_reprocessed(id).await
    }

    pub async fn cleanup_dlq(&self, older_than_days: i64) -> Result<u64> {
        let deleted = self.dlq_store.cleanup_old_entries(older_than_days).await?;
        if deleted > 0 {
            info!(deleted, older_than_days, "Old DLQ entries removed");
        }
        Ok(deleted)
    }

    // ------------------------------------------------------------------
    // Locks
    // ------------------------------------------------------------------

    pub async fn acquire_lock(
        &self,
        scope: &LockScope,
        owner: &str,
        lease_ms: i64,
    ) -> Result<LockAcquisition> {
        self.lock_store.try_acquire(&scope.key(), owner, lease_ms).await
    }

    pub async fn extend_lock(&self, scope: &LockScope, owner: &str, lease_ms: i64) -> Result<bool> {
        self.lock_store.extend(&scope.key(), owner, lease_ms).await
    }

    pub async fn release_lock(&self, scope: &LockScope, owner: &str) -> Result<bool> {
        self.lock_store.release(&scope.key(), owner).await
    }

    pub async fn lock(&self, scope: &LockScope) -> Result<Option<ConcurrencyLock>> {
        self.lock_store.find(&scope.key()).await
    }
}

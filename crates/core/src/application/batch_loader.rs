// Job Batch Loader
// Claims a bounded batch under the queue-partition lock.

use crate::application::queue_manager::QueueManager;
use crate::application::worker::constants::PARTITION_LOCK_LEASE_MS;
use crate::domain::{Job, LockAcquisition, LockScope};
use crate::error::Result;
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of one load attempt
#[derive(Debug)]
pub enum BatchLoad {
    /// Jobs now leased to this worker (possibly none)
    Claimed(Vec<Job>),
    /// Another worker holds the partition lock
    Contended,
}

pub struct BatchLoader {
    manager: Arc<QueueManager>,
    queue: String,
    owner: String,
    batch_size: i64,
    lease_ms: i64,
    partition_lock: bool,
}

impl BatchLoader {
    pub fn new(
        manager: Arc<QueueManager>,
        queue: impl Into<String>,
        owner: impl Into<String>,
        batch_size: i64,
        lease_ms: i64,
    ) -> Self {
        Self {
            manager,
            queue: queue.into(),
            owner: owner.into(),
            batch_size,
            lease_ms,
            partition_lock: true,
        }
    }

    /// Claim without the partition lock. The per-job conditional claim alone
    /// already prevents double delivery; the lock only reduces contention.
    pub fn without_partition_lock(mut self) -> Self {
        self.partition_lock = false;
        self
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub async fn load(&self) -> Result<BatchLoad> {
        if !self.partition_lock {
            return self.claim().await.map(BatchLoad::Claimed);
        }

        let scope = LockScope::Queue(self.queue.clone());
        match self
            .manager
            .acquire_lock(&scope, &self.owner, PARTITION_LOCK_LEASE_MS)
            .await?
        {
            LockAcquisition::Acquired(_) => {}
            LockAcquisition::AlreadyLocked => {
                debug!(queue = %self.queue, "Queue partition locked by another worker");
                return Ok(BatchLoad::Contended);
            }
        }

        let claimed = self.claim().await;

        if let Err(e) = self.manager.release_lock(&scope, &self.owner).await {
            // Expires on its own after PARTITION_LOCK_LEASE_MS
            warn!(queue = %self.queue, error = %e, "Failed to release queue partition lock");
        }

        claimed.map(BatchLoad::Claimed)
    }

    async fn claim(&self) -> Result<Vec<Job>> {
        let jobs = self
            .manager
            .claim_batch(&self.queue, &self.owner, self.batch_size, self.lease_ms)
            .await?;
        if !jobs.is_empty() {
            debug!(queue = %self.queue, owner = %self.owner, claimed = jobs.len(), "Batch claimed");
        }
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::queue_manager::EnqueueOptions;
    use crate::domain::JobStatus;
    use crate::port::id_provider::mocks::SequentialIdProvider;
    use crate::port::time_provider::mocks::MockTimeProvider;
    use crate::port::InMemoryStore;
    use serde_json::json;

    fn manager() -> Arc<QueueManager> {
        let clock = Arc::new(MockTimeProvider::new(1_000));
        let store = Arc::new(InMemoryStore::new(clock.clone()));
        Arc::new(QueueManager::new(
            store.clone(),
            store.clone(),
            store,
            Arc::new(SequentialIdProvider::new("id")),
            clock,
        ))
    }

    async fn enqueue(manager: &QueueManager, n: usize) {
        for i in 0..n {
            manager
                .enqueue("t", json!({"n": i}), EnqueueOptions::default())
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_load_caps_at_batch_size_and_releases_lock() {
        let manager = manager();
        enqueue(&manager, 5).await;
        let loader = BatchLoader::new(manager.clone(), "app-queue", "w1", 3, 30_000);

        let BatchLoad::Claimed(jobs) = loader.load().await.unwrap() else {
            panic!("expected a claimed batch");
        };
        assert_eq!(jobs.len(), 3);
        assert!(jobs.iter().all(|j| j.status == JobStatus::Claimed));
        assert!(jobs.iter().all(|j| j.locked_by.as_deref() == Some("w1")));

        let scope = LockScope::Queue("app-queue".into());
        assert!(manager.lock(&scope).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_contended_when_partition_locked() {
        let manager = manager();
        enqueue(&manager, 1).await;
        let scope = LockScope::Queue("app-queue".into());
        manager.acquire_lock(&scope, "other", 5_000).await.unwrap();

        let loader = BatchLoader::new(manager.clone(), "app-queue", "w1", 10, 30_000);
        assert!(matches!(loader.load().await.unwrap(), BatchLoad::Contended));

        let unlocked = BatchLoader::new(manager, "app-queue", "w1", 10, 30_000)
            .without_partition_lock();
        assert!(matches!(unlocked.load().await.unwrap(), BatchLoad::Claimed(jobs) if jobs.len() == 1));
    }
}

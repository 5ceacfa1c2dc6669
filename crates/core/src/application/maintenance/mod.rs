// Maintenance Service
// Scheduled DLQ cleanup and purge of finished jobs

use crate::application::queue_manager::QueueManager;
use crate::application::worker::ShutdownToken;
use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    /// Unreprocessed DLQ entries older than this are deleted
    pub dlq_retention_days: i64,
    /// Completed/failed jobs older than this are deleted
    pub job_retention_days: i64,
    pub interval: Duration,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            dlq_retention_days: 30,
            job_retention_days: 7,
            interval: Duration::from_secs(24 * 3600),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub dlq_entries_removed: u64,
    pub jobs_purged: u64,
    pub leases_reclaimed: u64,
}

/// Maintenance scheduler
///
/// Runs cleanup every `interval` in the background
pub struct MaintenanceScheduler {
    manager: Arc<QueueManager>,
    config: MaintenanceConfig,
}

impl MaintenanceScheduler {
    pub fn new(manager: Arc<QueueManager>, config: MaintenanceConfig) -> Self {
        Self { manager, config }
    }

    /// Run maintenance loop until shutdown (spawn in tokio::spawn).
    /// The first pass runs immediately.
    pub async fn run(self, mut shutdown: ShutdownToken) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            dlq_retention_days = self.config.dlq_retention_days,
            job_retention_days = self.config.job_retention_days,
            "Maintenance scheduler started"
        );

        let mut tick = interval(self.config.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => {}
                _ = shutdown.wait() => break,
            }

            if let Err(e) = self.run_now().await {
                error!(error = %e, "Scheduled maintenance failed");
            }
        }

        info!("Maintenance scheduler stopped");
    }

    /// Run maintenance immediately
    pub async fn run_now(&self) -> Result<MaintenanceReport> {
        let dlq_entries_removed = self.manager.cleanup_dlq(self.config.dlq_retention_days).await?;
        let jobs_purged = self
            .manager
            .purge_finished(self.config.job_retention_days * MILLIS_PER_DAY)
            .await?;
        let leases_reclaimed = self.manager.reclaim_expired().await?;

        let report = MaintenanceReport {
            dlq_entries_removed,
            jobs_purged,
            leases_reclaimed,
        };
        info!(
            dlq_entries_removed,
            jobs_purged, leases_reclaimed, "Maintenance completed"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::queue_manager::EnqueueOptions;
    use crate::application::worker::shutdown_channel;
    use crate::port::id_provider::mocks::SequentialIdProvider;
    use crate::port::time_provider::mocks::MockTimeProvider;
    use crate::port::InMemoryStore;
    use serde_json::json;

    fn setup() -> (Arc<MockTimeProvider>, Arc<QueueManager>) {
        let clock = Arc::new(MockTimeProvider::new(0));
        let store = Arc::new(InMemoryStore::new(clock.clone()));
        let manager = Arc::new(QueueManager::new(
            store.clone(),
            store.clone(),
            store,
            Arc::new(SequentialIdProvider::new("id")),
            clock.clone(),
        ));
        (clock, manager)
    }

    #[tokio::test]
    async fn test_run_now_cleans_old_records() {
        let (clock, manager) = setup();
        for _ in 0..2 {
            manager
                .enqueue("t", json!({}), EnqueueOptions::default())
                .await
                .unwrap();
        }
        let jobs = manager.claim_batch("app-queue", "w", 2, 60_000).await.unwrap();
        manager.complete(&jobs[0]).await.unwrap();
        let entry = manager.move_to_dlq(&jobs[1], "boom").await.unwrap().unwrap();

        let scheduler = MaintenanceScheduler::new(manager.clone(), MaintenanceConfig::default());
        assert_eq!(scheduler.run_now().await.unwrap(), MaintenanceReport::default());

        clock.advance(31 * MILLIS_PER_DAY);
        let report = scheduler.run_now().await.unwrap();
        assert_eq!(report.dlq_entries_removed, 1);
        assert_eq!(report.jobs_purged, 2);
        assert!(manager.dlq_entry(&entry.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (_, manager) = setup();
        let scheduler = MaintenanceScheduler::new(
            manager,
            MaintenanceConfig {
                interval: Duration::from_millis(10),
                ..MaintenanceConfig::default()
            },
        );
        let (tx, token) = shutdown_channel();
        let handle = tokio::spawn(scheduler.run(token));
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.shutdown();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}

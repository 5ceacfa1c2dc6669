// Crash recovery
use crate::application::queue_manager::QueueManager;
use crate::error::Result;
use std::sync::Arc;
use tracing::info;

/// Crash recovery service
///
/// On worker startup, hands back jobs whose worker died mid-lease. Claiming
/// already treats expired leases as eligible; this makes them visible as
/// `pending` again (stats, `attempt` untouched) before the first poll.
pub struct RecoveryService {
    manager: Arc<QueueManager>,
}

impl RecoveryService {
    pub fn new(manager: Arc<QueueManager>) -> Self {
        Self { manager }
    }

    /// Reset every job whose lease expired back to `pending`
    ///
    /// # Returns
    /// Number of jobs recovered
    pub async fn recover_expired_leases(&self) -> Result<u64> {
        info!("Starting expired lease recovery");
        let recovered = self.manager.reclaim_expired().await?;
        info!(recovered_count = recovered, "Expired lease recovery complete");
        Ok(recovered)
    }
}

// Worker - poll, dispatch, settle loop

pub mod config;
pub mod constants;
mod executor;
mod panic_guard;
mod shutdown;


use constants::*;
pub use config::WorkerConfig;
pub use executor::{JobExecutor, Settlement};
pub use panic_guard::{outcome_from_join_error, panic_message, AbortOnDrop};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::application::batch_loader::{BatchLoad, BatchLoader};
use crate::application::handlers::HandlerRegistry;
use crate::application::queue_manager::QueueManager;
use crate::application::retry::RetryPolicy;
use crate::domain::Job;
use crate::error::Result;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

/// Tally of one dispatched batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub completed: usize,
    pub retried: usize,
    pub dead_lettered: usize,
    pub lease_lost: usize,
    pub unsettled: usize,
    /// Still running when the shutdown grace period ran out
    pub aborted: usize,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.completed + self.retried + self.dead_lettered + self.lease_lost + self.unsettled + self.aborted
    }

    fn record(&mut self, joined: std::result::Result<Settlement, JoinError>) {
        match joined {
            Ok(Settlement::Completed) => self.completed += 1,
            Ok(Settlement::Retried { .. }) => self.retried += 1,
            Ok(Settlement::DeadLettered { .. }) => self.dead_lettered += 1,
            Ok(Settlement::LeaseLost) => self.lease_lost += 1,
            Ok(Settlement::Unsettled { .. }) => self.unsettled += 1,
            Err(e) if e.is_cancelled() => self.aborted += 1,
            Err(e) => {
                // Executor itself panicked; the job is left to lease expiry
                error!(error = %e, "Job task failed outside its handler");
                self.unsettled += 1;
            }
        }
    }
}

/// Result of one poll cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Processed(BatchReport),
    /// Nothing due
    Idle,
    /// Another worker was claiming this queue
    Contended,
}

/// Worker processes jobs from one queue
pub struct Worker {
    worker_id: String,
    config: Arc<WorkerConfig>,
    loader: BatchLoader,
    executor: Arc<JobExecutor>,
    semaphore: Arc<Semaphore>,
}

impl Worker {
    /// Create a worker. Fails on an invalid configuration.
    pub fn new(
        config: WorkerConfig,
        manager: Arc<QueueManager>,
        registry: Arc<HandlerRegistry>,
        retry_policy: Arc<RetryPolicy>,
    ) -> Result<Self> {
        config.validate()?;

        let worker_id = config
            .worker_id
            .clone()
            .unwrap_or_else(|| format!("worker-{}", manager.id_provider().generate_id()));

        let mut loader = BatchLoader::new(
            manager.clone(),
            config.queue_name.clone(),
            worker_id.clone(),
            config.batch_size,
            config.lease_duration_ms,
        );
        if !config.partition_lock {
            loader = loader.without_partition_lock();
        }

        let semaphore = Arc::new(Semaphore::new(config.concurrency));
        let config = Arc::new(config);
        let executor = Arc::new(JobExecutor::new(manager, registry, retry_policy, config.clone()));

        Ok(Self {
            worker_id,
            config,
            loader,
            executor,
            semaphore,
        })
    }

    pub fn id(&self) -> &str {
        &self.worker_id
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Run worker loop with graceful shutdown support
    pub async fn run(&self, mut shutdown: ShutdownToken) -> Result<()> {
        info!(
            worker_id = %self.worker_id,
            queue = %self.config.queue_name,
            concurrency = self.config.concurrency,
            batch_size = self.config.batch_size,
            "Worker started"
        );

        loop {
            if shutdown.is_shutdown() {
                info!(worker_id = %self.worker_id, "Worker shutting down");
                break;
            }

            let pause = match self.poll_once(&shutdown).await {
                // Work was found: poll again right away
                Ok(PollOutcome::Processed(report)) => {
                    debug!(worker_id = %self.worker_id, ?report, "Batch settled");
                    None
                }
                Ok(PollOutcome::Idle) | Ok(PollOutcome::Contended) => {
                    Some(self.config.processing_interval())
                }
                Err(e) => {
                    error!(worker_id = %self.worker_id, error = %e, "Worker poll failed");
                    Some(ERROR_RECOVERY_SLEEP_DURATION.max(self.config.processing_interval()))
                }
            };

            if let Some(pause) = pause {
                tokio::select! {
                    _ = sleep(pause) => {},
                    _ = shutdown.wait() => {
                        info!(worker_id = %self.worker_id, "Worker interrupted during idle");
                        break;
                    }
                }
            }
        }

        info!(worker_id = %self.worker_id, "Worker stopped");
        Ok(())
    }

    /// One poll cycle: claim a batch, execute it, wait for settlement.
    /// Never claims once shutdown was requested.
    pub async fn poll_once(&self, shutdown: &ShutdownToken) -> Result<PollOutcome> {
        if shutdown.is_shutdown() {
            return Ok(PollOutcome::Idle);
        }

        let jobs = match self.loader.load().await? {
            BatchLoad::Contended => return Ok(PollOutcome::Contended),
            BatchLoad::Claimed(jobs) if jobs.is_empty() => return Ok(PollOutcome::Idle),
            BatchLoad::Claimed(jobs) => jobs,
        };

        debug!(worker_id = %self.worker_id, claimed = jobs.len(), "Dispatching batch");
        let report = self.process_batch(jobs, shutdown).await;
        Ok(PollOutcome::Processed(report))
    }

    async fn process_batch(&self, jobs: Vec<Job>, shutdown: &ShutdownToken) -> BatchReport {
        let mut set = JoinSet::new();

        for job in jobs {
            let semaphore = Arc::clone(&self.semaphore);
            let executor = Arc::clone(&self.executor);

            set.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return Settlement::Unsettled {
                            error: "worker semaphore closed".to_string(),
                        }
                    }
                };
                executor.execute(job).await
            });
        }

        self.drain(set, shutdown.clone()).await
    }

    /// Wait for every job of the batch. After shutdown is requested the
    /// remaining jobs get `shutdown_timeout`, then are aborted and left to
    /// lease expiry.
    async fn drain(&self, mut set: JoinSet<Settlement>, mut shutdown: ShutdownToken) -> BatchReport {
        let mut report = BatchReport::default();

        if !shutdown.is_shutdown() {
            let finished = tokio::select! {
                _ = join_all(&mut set, &mut report) => true,
                _ = shutdown.wait() => false,
            };
            if finished {
                return report;
            }
        }

        if set.is_empty() {
            return report;
        }

        info!(
            worker_id = %self.worker_id,
            in_flight = set.len(),
            grace_ms = self.config.shutdown_timeout_ms,
            "Shutdown requested, draining in-flight jobs"
        );

        if timeout(self.config.shutdown_timeout(), join_all(&mut set, &mut report))
            .await
            .is_err()
        {
            warn!(
                worker_id = %self.worker_id,
                aborted = set.len(),
                "Grace period elapsed, aborting in-flight jobs"
            );
            set.abort_all();
            join_all(&mut set, &mut report).await;
        }

        report
    }
}

async fn join_all(set: &mut JoinSet<Settlement>, report: &mut BatchReport) {
    while let Some(joined) = set.join_next().await {
        report.record(joined);
    }
}

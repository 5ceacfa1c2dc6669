// Job Executor
// Runs one claimed job: dispatch, heartbeat, time-box, settlement.

use super::config::WorkerConfig;
use super::constants::{HANDLER_TIMEOUT_REASON, SETTLE_MAX_RETRIES, SETTLE_RETRY_BASE_DELAY};
use super::panic_guard::{outcome_from_join_error, AbortOnDrop};
use crate::application::handlers::HandlerRegistry;
use crate::application::queue_manager::QueueManager;
use crate::application::retry::{RetryDecision, RetryPolicy};
use crate::domain::{Job, UNKNOWN_JOB_TYPE_REASON};
use crate::error::Result;
use crate::port::{JobContext, JobMetadata, JobOutcome};
use std::future::Future;
use std::sync::Arc;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tracing::{debug, error, info_span, warn, Instrument};

/// How an execution was settled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    Completed,
    /// Back to pending, eligible again after `delay_ms`
    Retried { delay_ms: i64 },
    DeadLettered { reason: String },
    /// The lease passed to another worker; nothing was written
    LeaseLost,
    /// The store stayed unavailable; the job is left to lease expiry
    Unsettled { error: String },
}

pub struct JobExecutor {
    manager: Arc<QueueManager>,
    registry: Arc<HandlerRegistry>,
    retry_policy: Arc<RetryPolicy>,
    config: Arc<WorkerConfig>,
}

impl JobExecutor {
    pub fn new(
        manager: Arc<QueueManager>,
        registry: Arc<HandlerRegistry>,
        retry_policy: Arc<RetryPolicy>,
        config: Arc<WorkerConfig>,
    ) -> Self {
        Self {
            manager,
            registry,
            retry_policy,
            config,
        }
    }

    /// Execute a job claimed by this worker and settle its outcome
    pub async fn execute(&self, job: Job) -> Settlement {
        match self
            .manager
            .mark_processing(&job, self.config.lease_duration_ms)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                warn!(job_id = %job.id, "Lease expired before execution started");
                return Settlement::LeaseLost;
            }
            // Still ours; the heartbeat will tell if that changes
            Err(e) => warn!(job_id = %job.id, error = %e, "Failed to mark job processing"),
        }

        let outcome = match self.registry.get(&job.job_type) {
            Some(handler) => match self.run_handler(&job, handler).await {
                Some(outcome) => outcome,
                None => return Settlement::LeaseLost,
            },
            None => {
                warn!(job_id = %job.id, job_type = %job.job_type, "No handler registered for job type");
                JobOutcome::terminal(UNKNOWN_JOB_TYPE_REASON)
            }
        };

        self.settle(&job, outcome).await
    }

    /// Run the handler in its own task with heartbeat and time-box.
    /// `None` means the lease was lost mid-run and the handler was aborted.
    async fn run_handler(
        &self,
        job: &Job,
        handler: Arc<dyn crate::port::JobHandler>,
    ) -> Option<JobOutcome> {
        let span = info_span!(
            "job",
            job_id = %job.id,
            job_type = %job.job_type,
            attempt = job.attempt + 1
        );
        let ctx = JobContext {
            job_id: job.id.clone(),
            job_type: job.job_type.clone(),
            payload: job.payload.clone(),
            metadata: JobMetadata {
                attempt: job.attempt + 1,
                max_attempts: job.max_attempts,
                queued_at: job.created_at,
                processing_at: self.manager.now_millis(),
            },
            span: span.clone(),
        };

        let mut task = AbortOnDrop(tokio::spawn(
            async move { handler.handle(ctx).await }.instrument(span),
        ));

        let deadline = sleep(self.config.handler_timeout());
        tokio::pin!(deadline);

        let period = self.config.heartbeat_interval();
        let mut heartbeat = interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                joined = &mut task.0 => {
                    return Some(match joined {
                        Ok(outcome) => outcome,
                        Err(e) => outcome_from_join_error(e),
                    });
                }
                _ = &mut deadline => {
                    task.0.abort();
                    warn!(
                        job_id = %job.id,
                        timeout_ms = self.config.handler_timeout_ms,
                        "Job handler exceeded its time-box"
                    );
                    return Some(JobOutcome::retry(HANDLER_TIMEOUT_REASON));
                }
                _ = heartbeat.tick() => {
                    match self.manager.extend_lease(job, self.config.lease_duration_ms).await {
                        Ok(true) => debug!(job_id = %job.id, "Lease extended"),
                        Ok(false) => {
                            warn!(job_id = %job.id, "Lease lost during execution, abandoning job");
                            return None;
                        }
                        Err(e) => warn!(job_id = %job.id, error = %e, "Heartbeat failed"),
                    }
                }
            }
        }
    }

    async fn settle(&self, job: &Job, outcome: JobOutcome) -> Settlement {
        let result = match outcome {
            JobOutcome::Success => self
                .with_store_retry(job, || self.manager.complete(job))
                .await
                .map(|applied| applied.then_some(Settlement::Completed)),
            JobOutcome::Retry(error) => self.settle_failure(job, &error, false).await,
            JobOutcome::Terminal(error) => self.settle_failure(job, &error, true).await,
        };

        match result {
            Ok(Some(settlement)) => settlement,
            Ok(None) => Settlement::LeaseLost,
            Err(e) => {
                error!(job_id = %job.id, error = %e, "Settlement abandoned, job left to lease expiry");
                Settlement::Unsettled {
                    error: e.to_string(),
                }
            }
        }
    }

    async fn settle_failure(
        &self,
        job: &Job,
        error: &str,
        terminal: bool,
    ) -> Result<Option<Settlement>> {
        match self.retry_policy.decide(job, error, terminal) {
            RetryDecision::Retry { delay_ms } => Ok(self
                .with_store_retry(job, || self.manager.retry(job, delay_ms, error))
                .await?
                .then_some(Settlement::Retried { delay_ms })),
            RetryDecision::DeadLetter { reason } => Ok(self
                .with_store_retry(job, || self.manager.move_to_dlq(job, &reason))
                .await?
                .map(|_| Settlement::DeadLettered { reason: reason.clone() })),
        }
    }

    /// Retry a store write on transient errors with doubling delay
    async fn with_store_retry<T, F, Fut>(&self, job: &Job, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut tries = 0;
        loop {
            match op().await {
                Err(e) if e.is_transient() && tries < SETTLE_MAX_RETRIES => {
                    let delay = SETTLE_RETRY_BASE_DELAY * 2u32.pow(tries);
                    tries += 1;
                    warn!(
                        job_id = %job.id,
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "Store unavailable during settlement, retrying"
                    );
                    sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}

// Retry policy: settlement decision + exponential backoff
use crate::domain::Job;
use serde::Deserialize;
use tracing::{info, warn};

/// Backoff curve
///
/// delay = min(min(base_delay * factor ^ attempt, max_delay) * jitter, max_delay)
///
/// `attempt` is the number of failures before the current one, so the first
/// retry waits `base_delay_ms`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub base_delay_ms: i64,
    pub factor: f64,
    pub max_delay_ms: i64,
    /// Apply ±10% per-job jitter
    pub jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            factor: 2.0,
            max_delay_ms: 60 * 60 * 1_000,
            jitter: true,
        }
    }
}

/// Retry decision result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Put the job back to pending, available again after `delay_ms`
    Retry { delay_ms: i64 },
    /// Exile the job to the DLQ with `reason`
    DeadLetter { reason: String },
}

/// Decides between retry and DLQ for a failed execution
pub struct RetryPolicy {
    backoff: BackoffConfig,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(backoff: BackoffConfig) -> Self {
        Self { backoff }
    }

    pub fn backoff(&self) -> &BackoffConfig {
        &self.backoff
    }

    /// Decide what to do with a job whose execution just failed
    ///
    /// Returns:
    /// - `RetryDecision::DeadLetter` if the failure is terminal or this was the last attempt
    /// - `RetryDecision::Retry(delay_ms)` otherwise
    pub fn decide(&self, job: &Job, error: &str, terminal: bool) -> RetryDecision {
        if terminal {
            warn!(
                job_id = %job.id,
                attempt = %(job.attempt + 1),
                error = %error,
                "Terminal failure, skipping remaining attempts"
            );
            return RetryDecision::DeadLetter {
                reason: error.to_string(),
            };
        }

        if job.is_last_attempt() {
            warn!(
                job_id = %job.id,
                attempt = %(job.attempt + 1),
                max_attempts = %job.max_attempts,
                "Max retry attempts reached"
            );
            return RetryDecision::DeadLetter {
                reason: error.to_string(),
            };
        }

        let delay_ms = self.delay_for(&job.id, job.attempt);

        info!(
            job_id = %job.id,
            attempt = %(job.attempt + 1),
            max_attempts = %job.max_attempts,
            delay_ms = %delay_ms,
            "Scheduling retry"
        );

        RetryDecision::Retry { delay_ms }
    }

    /// Backoff delay after the `attempt`-th failure (0-based)
    pub fn delay_for(&self, job_id: &str, attempt: i32) -> i64 {
        let raw = self.backoff.base_delay_ms as f64 * self.backoff.factor.powi(attempt.max(0));
        let capped = raw.min(self.backoff.max_delay_ms as f64);

        if !self.backoff.jitter {
            return capped as i64;
        }

        // Use job id as seed: deterministic jitter per job, spread across jobs
        let jitter_seed = job_id.chars().map(|c| c as u32).sum::<u32>();
        let jitter_factor = 0.9 + ((jitter_seed % 21) as f64 / 100.0); // 0.9 to 1.1

        (capped * jitter_factor).min(self.backoff.max_delay_ms as f64) as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{JobPayload, JobType};
    use serde_json::json;

    fn job(attempt: i32, max_attempts: i32) -> Job {
        let mut job = Job::new_test("q", JobType::new("t"), JobPayload::new(json!({})));
        job.attempt = attempt;
        job.max_attempts = max_attempts;
        job
    }

    fn no_jitter() -> RetryPolicy {
        RetryPolicy::new(BackoffConfig {
            jitter: false,
            ..BackoffConfig::default()
        })
    }

    #[test]
    fn test_exponential_delay() {
        let policy = no_jitter();
        assert_eq!(policy.delay_for("j", 0), 1_000);
        assert_eq!(policy.delay_for("j", 1), 2_000);
        assert_eq!(policy.delay_for("j", 4), 16_000);
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = RetryPolicy::new(BackoffConfig {
            base_delay_ms: 1_000,
            factor: 10.0,
            max_delay_ms: 5_000,
            jitter: false,
        });
        assert_eq!(policy.delay_for("j", 3), 5_000);
    }

    #[test]
    fn test_jitter_stays_within_ten_percent() {
        let policy = RetryPolicy::default();
        for id in ["a", "job-17", "5f0c1e62-0d8e-4c1b-9c55-1d0d3b7e2a11"] {
            let delay = policy.delay_for(id, 1);
            assert!((1_800..=2_200).contains(&delay), "delay {} out of range", delay);
            assert_eq!(delay, policy.delay_for(id, 1));
        }
    }

    #[test]
    fn test_jitter_never_exceeds_cap() {
        let policy = RetryPolicy::new(BackoffConfig {
            base_delay_ms: 1_000,
            factor: 2.0,
            max_delay_ms: 5_000,
            jitter: true,
        });
        for id in ["a", "b", "job-17", "zz", "5f0c1e62-0d8e-4c1b-9c55-1d0d3b7e2a11"] {
            let delay = policy.delay_for(id, 10);
            assert!((4_500..=5_000).contains(&delay), "delay {} out of range", delay);
        }
    }

    #[test]
    fn test_retry_while_budget_remains() {
        let decision = no_jitter().decide(&job(1, 3), "smtp timeout", false);
        assert_eq!(decision, RetryDecision::Retry { delay_ms: 2_000 });
    }

    #[test]
    fn test_dead_letter_on_last_attempt() {
        let decision = no_jitter().decide(&job(2, 3), "smtp timeout", false);
        assert_eq!(
            decision,
            RetryDecision::DeadLetter {
                reason: "smtp timeout".into()
            }
        );
    }

    #[test]
    fn test_terminal_failure_skips_budget() {
        let decision = no_jitter().decide(&job(0, 5), "invalid address", true);
        assert!(matches!(decision, RetryDecision::DeadLetter { .. }));
    }
}

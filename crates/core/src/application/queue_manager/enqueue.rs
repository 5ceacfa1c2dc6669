// Enqueue Use Case

use crate::domain::{Job, JobId, JobPayload, JobType, DEFAULT_MAX_ATTEMPTS};
use crate::error::{AppError, Result};
use crate::port::{IdProvider, JobStore, TimeProvider};
use serde::{Deserialize, Serialize};
use tracing::info;

pub const MAX_QUEUE_NAME_LEN: usize = 64;
pub const MAX_JOB_TYPE_LEN: usize = 128;
pub const PRIORITY_RANGE: std::ops::RangeInclusive<i32> = -100..=100;
pub const MAX_ATTEMPTS_RANGE: std::ops::RangeInclusive<i32> = 1..=100;
pub const MAX_PAYLOAD_DEPTH: usize = 32;

/// Producer-side options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnqueueOptions {
    /// Target queue; the manager's default queue when absent
    #[serde(default)]
    pub queue: Option<String>,

    #[serde(default)]
    pub priority: i32,

    /// Retry budget; [`DEFAULT_MAX_ATTEMPTS`] when absent
    #[serde(default)]
    pub max_attempts: Option<i32>,

    /// Delay before the job becomes eligible
    #[serde(default)]
    pub delay_ms: i64,
}

/// Enqueue request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueRequest {
    pub job_type: String,
    pub payload: serde_json::Value,

    #[serde(default)]
    pub options: EnqueueOptions,

    /// Lineage root, set when re-enqueuing from the DLQ
    #[serde(default)]
    pub original_job_id: Option<JobId>,
}

impl EnqueueRequest {
    pub fn new(job_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            job_type: job_type.into(),
            payload,
            options: EnqueueOptions::default(),
            original_job_id: None,
        }
    }

    pub fn with_options(mut self, options: EnqueueOptions) -> Self {
        self.options = options;
        self
    }
}

/// Validate an enqueue request before anything touches the store
pub fn validate_request(req: &EnqueueRequest) -> Result<()> {
    if req.job_type.trim().is_empty() {
        return Err(AppError::Validation("job type must not be empty".to_string()));
    }
    if req.job_type.len() > MAX_JOB_TYPE_LEN {
        return Err(AppError::Validation(format!(
            "job type too long (max {} chars)",
            MAX_JOB_TYPE_LEN
        )));
    }

    if let Some(queue) = &req.options.queue {
        validate_queue_name(queue)?;
    }

    if !PRIORITY_RANGE.contains(&req.options.priority) {
        return Err(AppError::Validation(format!(
            "priority {} out of range ({}..={})",
            req.options.priority,
            PRIORITY_RANGE.start(),
            PRIORITY_RANGE.end()
        )));
    }

    if let Some(max_attempts) = req.options.max_attempts {
        if !MAX_ATTEMPTS_RANGE.contains(&max_attempts) {
            return Err(AppError::Validation(format!(
                "max_attempts {} out of range ({}..={})",
                max_attempts,
                MAX_ATTEMPTS_RANGE.start(),
                MAX_ATTEMPTS_RANGE.end()
            )));
        }
    }

    if req.options.delay_ms < 0 {
        return Err(AppError::Validation("delay_ms must not be negative".to_string()));
    }

    if json_depth(&req.payload) > MAX_PAYLOAD_DEPTH {
        return Err(AppError::Validation(format!(
            "payload too deeply nested (max depth {})",
            MAX_PAYLOAD_DEPTH
        )));
    }

    Ok(())
}

/// Queue names: 1-64 chars of ASCII alphanumerics, '-', '_' or '.'
pub fn validate_queue_name(queue: &str) -> Result<()> {
    if queue.is_empty() {
        return Err(AppError::Validation("queue name must not be empty".to_string()));
    }
    if queue.len() > MAX_QUEUE_NAME_LEN {
        return Err(AppError::Validation(format!(
            "queue name too long (max {} chars)",
            MAX_QUEUE_NAME_LEN
        )));
    }
    if !queue
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(AppError::Validation(
            "queue name must be alphanumeric (plus '-', '_', '.')".to_string(),
        ));
    }
    Ok(())
}

fn json_depth(value: &serde_json::Value) -> usize {
    match value {
        serde_json::Value::Array(items) => 1 + items.iter().map(json_depth).max().unwrap_or(0),
        serde_json::Value::Object(map) => 1 + map.values().map(json_depth).max().unwrap_or(0),
        _ => 0,
    }
}

/// Execute enqueue use case
///
/// # Arguments
///
/// * `job_store` - Job store
/// * `id_provider` - ID generator (injected for determinism)
/// * `time_provider` - Time provider (injected for determinism)
/// * `default_queue` - Queue used when the request names none
/// * `req` - Enqueue request
pub async fn execute(
    job_store: &dyn JobStore,
    id_provider: &dyn IdProvider,
    time_provider: &dyn TimeProvider,
    default_queue: &str,
    req: EnqueueRequest,
) -> Result<JobId> {
    validate_request(&req)?;

    let job_id = id_provider.generate_id();
    let created_at = time_provider.now_millis();
    let queue = req.options.queue.unwrap_or_else(|| default_queue.to_string());

    let mut job = Job::new(
        job_id.clone(),
        created_at,
        queue,
        JobType::new(req.job_type),
        JobPayload::new(req.payload),
    );
    job.priority = req.options.priority;
    job.max_attempts = req.options.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS);
    job.available_at = created_at + req.options.delay_ms;
    job.original_job_id = req.original_job_id;

    job_store.insert(&job).await?;

    info!(
        job_id = %job.id,
        job_type = %job.job_type,
        queue = %job.queue,
        priority = job.priority,
        available_at = job.available_at,
        "Job enqueued"
    );

    Ok(job_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(queue: &str) -> EnqueueRequest {
        EnqueueRequest::new("email.send", json!({})).with_options(EnqueueOptions {
            queue: Some(queue.to_string()),
            ..EnqueueOptions::default()
        })
    }

    #[test]
    fn test_validate_queue_name_empty() {
        let result = validate_request(&request(""));
        assert!(result.unwrap_err().to_string().contains("empty"));
    }

    #[test]
    fn test_validate_queue_name_too_long() {
        let result = validate_request(&request(&"a".repeat(65)));
        assert!(result.unwrap_err().to_string().contains("too long"));
    }

    #[test]
    fn test_validate_queue_name_invalid_chars() {
        let result = validate_request(&request("invalid@queue!"));
        assert!(result.unwrap_err().to_string().contains("alphanumeric"));
    }

    #[test]
    fn test_validate_priority_out_of_range() {
        let mut req = request("mail");
        req.options.priority = 101;
        assert!(validate_request(&req).unwrap_err().to_string().contains("out of range"));
    }

    #[test]
    fn test_validate_max_attempts() {
        let mut req = request("mail");
        req.options.max_attempts = Some(0);
        assert!(validate_request(&req).is_err());
        req.options.max_attempts = Some(1);
        assert!(validate_request(&req).is_ok());
    }

    #[test]
    fn test_validate_payload_depth() {
        let mut deep = json!({"level": 0});
        for i in 1..=35 {
            deep = json!({"level": i, "nested": deep});
        }
        let mut req = request("mail");
        req.payload = deep;
        assert!(validate_request(&req).unwrap_err().to_string().contains("deeply nested"));
    }

    #[test]
    fn test_validate_valid_request() {
        let mut req = request("app-queue");
        req.payload = json!({"to": "a@example.com", "tags": ["welcome"]});
        req.options.priority = 50;
        tokio_test::assert_ok!(validate_request(&req));
    }
}

// Job Handler Port
// Handlers are registered by job type and classify their own result.

use crate::domain::{JobId, JobPayload, JobType};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::future::Future;

/// Attempt metadata handed to a handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobMetadata {
    /// 1-based number of the current try
    pub attempt: i32,
    pub max_attempts: i32,
    /// When the job was enqueued (epoch ms)
    pub queued_at: i64,
    /// When this execution started (epoch ms)
    pub processing_at: i64,
}

impl JobMetadata {
    pub fn is_final_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}

/// Everything a handler receives for one execution
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: JobId,
    pub job_type: JobType,
    pub payload: JobPayload,
    pub metadata: JobMetadata,
    /// Span carrying `job_id` / `job_type`; handler logs should be emitted inside it
    pub span: tracing::Span,
}

impl JobContext {
    /// Decode the payload; a malformed payload is a terminal failure
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, JobOutcome> {
        serde_json::from_value(self.payload.as_value().clone())
            .map_err(|e| JobOutcome::Terminal(format!("malformed payload: {}", e)))
    }
}

/// Result of one handler execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Success,
    /// Failed, worth another attempt if the budget allows
    Retry(String),
    /// Failed, never worth retrying
    Terminal(String),
}

impl JobOutcome {
    pub fn retry(error: impl Into<String>) -> Self {
        JobOutcome::Retry(error.into())
    }

    pub fn terminal(error: impl Into<String>) -> Self {
        JobOutcome::Terminal(error.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Success)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobOutcome::Terminal(_))
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            JobOutcome::Success => None,
            JobOutcome::Retry(e) | JobOutcome::Terminal(e) => Some(e),
        }
    }
}

/// Job handler.
///
/// Handlers must be idempotent: delivery is at-least-once, and a job whose
/// lease expires mid-execution may run again on another worker.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, ctx: JobContext) -> JobOutcome;
}

/// Adapter turning an async closure into a [`JobHandler`]
pub struct FnHandler<F> {
    f: F,
}

/// Wrap an async closure as a handler
///
/// # Example
/// ```text
/// registry.register("email.send", handler_fn(|ctx| async move {
///     tracing::info!(parent: &ctx.span, "sending");
///     JobOutcome::Success
/// }));
/// ```
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(JobContext) -> Fut + Send + Sync,
    Fut: Future<Output = JobOutcome> + Send,
{
    FnHandler { f }
}

#[async_trait]
impl<F, Fut> JobHandler for FnHandler<F>
where
    F: Fn(JobContext) -> Fut + Send + Sync,
    Fut: Future<Output = JobOutcome> + Send,
{
    async fn handle(&self, ctx: JobContext) -> JobOutcome {
        (self.f)(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Email {
        to: String,
    }

    fn ctx(payload: serde_json::Value) -> JobContext {
        JobContext {
            job_id: "job-1".into(),
            job_type: JobType::new("email.send"),
            payload: JobPayload::new(payload),
            metadata: JobMetadata {
                attempt: 1,
                max_attempts: 3,
                queued_at: 0,
                processing_at: 10,
            },
            span: tracing::Span::none(),
        }
    }

    #[test]
    fn test_payload_as_decodes() {
        let email: Email = ctx(json!({"to": "a@example.com"})).payload_as().unwrap();
        assert_eq!(email.to, "a@example.com");
    }

    #[test]
    fn test_malformed_payload_is_terminal() {
        let err = ctx(json!({"recipient": 1})).payload_as::<Email>().unwrap_err();
        assert!(err.is_terminal());
        assert!(err.error().unwrap().contains("malformed payload"));
    }

    #[tokio::test]
    async fn test_handler_fn_adapter() {
        let handler = handler_fn(|ctx: JobContext| async move {
            if ctx.metadata.is_final_attempt() {
                JobOutcome::terminal("giving up")
            } else {
                JobOutcome::retry("try again")
            }
        });

        assert_eq!(handler.handle(ctx(json!({}))).await, JobOutcome::retry("try again"));
    }
}

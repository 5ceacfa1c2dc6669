//! Handlers bundled with the standalone worker

use async_trait::async_trait;
use courier_core::application::HandlerRegistry;
use courier_core::port::{JobContext, JobHandler, JobOutcome};
use serde::Deserialize;
use tracing::info;

pub const LOG_MESSAGE_JOB: &str = "log.message";

#[derive(Debug, Deserialize)]
struct LogMessage {
    message: String,
    #[serde(default)]
    level: Option<String>,
}

/// Writes the payload's `message` to the worker log.
/// Useful as a smoke test for a fresh deployment.
pub struct LogMessageHandler;

#[async_trait]
impl JobHandler for LogMessageHandler {
    async fn handle(&self, ctx: JobContext) -> JobOutcome {
        let payload: LogMessage = match ctx.payload_as() {
            Ok(payload) => payload,
            Err(outcome) => return outcome,
        };

        match payload.level.as_deref() {
            None | Some("info") => info!(parent: &ctx.span, text = %payload.message, "Job message"),
            Some("warn") => tracing::warn!(parent: &ctx.span, text = %payload.message, "Job message"),
            Some(other) => return JobOutcome::terminal(format!("unsupported level: {}", other)),
        }
        JobOutcome::Success
    }
}

pub fn builtin_registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::default();
    registry.register(LOG_MESSAGE_JOB, LogMessageHandler);
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::domain::{JobPayload, JobType};
    use courier_core::port::JobMetadata;
    use serde_json::json;

    fn ctx(payload: serde_json::Value) -> JobContext {
        JobContext {
            job_id: "job-1".into(),
            job_type: JobType::new(LOG_MESSAGE_JOB),
            payload: JobPayload::new(payload),
            metadata: JobMetadata {
                attempt: 1,
                max_attempts: 3,
                queued_at: 0,
                processing_at: 0,
            },
            span: tracing::Span::none(),
        }
    }

    #[tokio::test]
    async fn test_logs_message() {
        let outcome = LogMessageHandler.handle(ctx(json!({"message": "hello"}))).await;
        assert_eq!(outcome, JobOutcome::Success);
    }

    #[tokio::test]
    async fn test_rejects_bad_payload() {
        let outcome = LogMessageHandler.handle(ctx(json!({"msg": "hello"}))).await;
        assert!(outcome.is_terminal());

        let outcome = LogMessageHandler
            .handle(ctx(json!({"message": "x", "level": "trace"})))
            .await;
        assert!(outcome.is_terminal());
    }

    #[test]
    fn test_builtin_registry() {
        assert!(builtin_registry().contains(&JobType::new(LOG_MESSAGE_JOB)));
    }
}

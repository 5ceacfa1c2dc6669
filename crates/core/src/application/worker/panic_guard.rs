// Panic isolation for handler tasks
// Handlers run in their own tokio task; a panic surfaces here as a JoinError.

use crate::application::worker::constants::HANDLER_CANCELLED_REASON;
use crate::port::JobOutcome;
use std::any::Any;
use tokio::task::{JoinError, JoinHandle};
use tracing::error;

/// Extract a readable message from a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

/// Classify a failed handler task.
///
/// A panic is terminal (the same input will panic again); a cancellation is
/// retriable.
pub fn outcome_from_join_error(err: JoinError) -> JobOutcome {
    if err.is_panic() {
        let payload = err.into_panic();
        let panic_msg = panic_message(payload.as_ref());
        error!(panic_msg = %panic_msg, "Job handler panicked");
        JobOutcome::terminal(format!("handler panicked: {}", panic_msg))
    } else {
        JobOutcome::retry(HANDLER_CANCELLED_REASON)
    }
}

/// Aborts the wrapped task when dropped, so an abandoned execution never
/// outlives the worker task that spawned it
pub struct AbortOnDrop<T>(pub JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_panic_is_terminal() {
        let err = tokio::spawn(async { panic!("boom") }).await.unwrap_err();
        let outcome = outcome_from_join_error(err);
        assert_eq!(outcome, JobOutcome::terminal("handler panicked: boom"));
    }

    #[tokio::test]
    async fn test_formatted_panic_message() {
        let id = 7;
        let err = tokio::spawn(async move { panic!("job {} exploded", id) })
            .await
            .unwrap_err();
        assert!(outcome_from_join_error(err)
            .error()
            .unwrap()
            .ends_with("job 7 exploded"));
    }

    #[tokio::test]
    async fn test_cancellation_is_retriable() {
        let handle = tokio::spawn(std::future::pending::<()>());
        handle.abort();
        let outcome = outcome_from_join_error(handle.await.unwrap_err());
        assert_eq!(outcome, JobOutcome::retry(HANDLER_CANCELLED_REASON));
    }

    #[tokio::test]
    async fn test_abort_on_drop() {
        let guard = AbortOnDrop(tokio::spawn(std::future::pending::<()>()));
        let abort = guard.0.abort_handle();
        drop(guard);
        for _ in 0..100 {
            if abort.is_finished() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(abort.is_finished());
    }
}

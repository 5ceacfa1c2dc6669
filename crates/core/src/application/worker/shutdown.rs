// Worker Shutdown Token

use tokio::sync::watch;

/// Shutdown signal for graceful termination.
///
/// Dropping the [`ShutdownSender`] counts as a shutdown request.
#[derive(Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    /// Check if shutdown was requested
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Wait for shutdown signal
    pub async fn wait(&mut self) {
        let _ = self.rx.wait_for(|stop| *stop).await;
    }
}

/// Shutdown sender
pub struct ShutdownSender {
    tx: watch::Sender<bool>,
}

impl ShutdownSender {
    /// Signal shutdown to every token
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

/// Create a shutdown channel
pub fn shutdown_channel() -> (ShutdownSender, ShutdownToken) {
    let (tx, rx) = watch::channel(false);
    (ShutdownSender { tx }, ShutdownToken { rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_returns_after_signal() {
        let (tx, mut token) = shutdown_channel();
        assert!(!token.is_shutdown());

        let waiter = tokio::spawn(async move {
            token.wait().await;
            token.is_shutdown()
        });
        tx.shutdown();

        let seen = tokio::time::timeout(Duration::from_secs(1), waiter).await;
        assert!(seen.unwrap().unwrap());
    }

    #[tokio::test]
    async fn test_dropped_sender_means_shutdown() {
        let (tx, mut token) = shutdown_channel();
        drop(tx);
        assert!(token.is_shutdown());
        tokio::time::timeout(Duration::from_secs(1), token.wait())
            .await
            .unwrap();
    }
}

//! Process shutdown signals

use anyhow::Result;
use std::future::Future;

/// Resolves on Ctrl+C (SIGINT) or, on Unix, SIGTERM; yields the signal name.
/// The SIGTERM handler is installed before this returns.
pub fn shutdown_signal() -> Result<impl Future<Output = &'static str>> {
    #[cfg(unix)]
    let mut terminate =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    Ok(async move {
        #[cfg(unix)]
        let received = tokio::select! {
            _ = tokio::signal::ctrl_c() => "SIGINT",
            _ = terminate.recv() => "SIGTERM",
        };
        #[cfg(not(unix))]
        let received = {
            let _ = tokio::signal::ctrl_c().await;
            "SIGINT"
        };
        received
    })
}

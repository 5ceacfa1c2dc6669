//! Courier Worker - standalone process draining one queue

mod handlers;
mod settings;
mod signal;
mod telemetry;

use anyhow::{Context, Result};
use courier_core::application::{
    shutdown_channel, MaintenanceScheduler, QueueManager, RecoveryService, RetryPolicy, Worker,
};
use courier_core::port::id_provider::UuidProvider;
use courier_core::port::time_provider::SystemTimeProvider;
use courier_infra_sqlite::{create_pool, SqliteDeadLetterStore, SqliteJobStore, SqliteLockStore};
use settings::{DaemonConfig, LogFormat};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Extra time granted on top of the worker's own grace period
const EXIT_MARGIN: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    let settings = DaemonConfig::load()?;

    // 1. Logging
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("courier=info"))
        .context("invalid log filter")?;
    let (otel_layer, otel_error) = match telemetry::layer() {
        Ok(layer) => (layer, None),
        Err(e) => (None, Some(e)),
    };

    tracing_subscriber::registry()
        .with(otel_layer)
        .with(env_filter)
        .with((settings.log_format == LogFormat::Json).then(|| fmt::layer().json()))
        .with((settings.log_format == LogFormat::Pretty).then(|| fmt::layer().pretty()))
        .init();

    info!("Courier worker v{} starting...", VERSION);
    if let Some(e) = otel_error {
        warn!(error = ?e, "Failed to initialize OpenTelemetry (continuing without it)");
    } else if telemetry::requested() && !cfg!(feature = "telemetry") {
        warn!("OpenTelemetry endpoint set but feature 'telemetry' not enabled");
    }

    // 2. Storage
    let db_path = settings.expanded_db_path();
    if let Some(dir) = db_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        if settings.db_path != ":memory:" {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("cannot create {}", dir.display()))?;
        }
    }
    info!(db_path = %db_path.display(), "Opening database...");
    let pool = create_pool(&settings.database_url())
        .await
        .context("DB pool creation failed")?;

    // 3. Wiring
    let time_provider = Arc::new(SystemTimeProvider);
    let manager = Arc::new(
        QueueManager::new(
            Arc::new(SqliteJobStore::new(pool.clone(), time_provider.clone())),
            Arc::new(SqliteDeadLetterStore::new(pool.clone(), time_provider.clone())),
            Arc::new(SqliteLockStore::new(pool.clone(), time_provider.clone())),
            Arc::new(UuidProvider),
            time_provider,
        )
        .with_default_queue(settings.queue_name.clone()),
    );
    manager
        .initialize()
        .await
        .context("queue initialization failed")?;

    // 4. Leases left behind by a previous crash
    match RecoveryService::new(manager.clone()).recover_expired_leases().await {
        Ok(count) => info!(recovered_jobs = count, "Lease recovery completed"),
        Err(e) => error!(error = ?e, "Lease recovery failed"),
    }

    // Installed before any job runs, so an early SIGTERM still drains
    let shutdown_signal = signal::shutdown_signal().context("cannot install signal handlers")?;

    // 5. Worker + maintenance
    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let worker_config = settings.worker_config();
    let grace = worker_config.shutdown_timeout() + EXIT_MARGIN;

    let worker = Worker::new(
        worker_config,
        manager.clone(),
        Arc::new(handlers::builtin_registry()),
        Arc::new(RetryPolicy::new(settings.backoff.clone())),
    )?;
    info!(worker_id = %worker.id(), "Starting worker...");

    let worker_token = shutdown_rx.clone();
    let worker_handle = tokio::spawn(async move {
        if let Err(e) = worker.run(worker_token).await {
            error!(error = ?e, "Worker failed");
        }
    });

    let maintenance = MaintenanceScheduler::new(manager, settings.maintenance_config());
    let maintenance_handle = tokio::spawn(maintenance.run(shutdown_rx));

    info!("System ready. Press Ctrl+C to shutdown");

    // 6. Graceful shutdown on SIGINT / SIGTERM
    let received = shutdown_signal.await;
    info!(signal = received, "Shutdown signal received. Draining in-flight jobs...");
    shutdown_tx.shutdown();

    if tokio::time::timeout(grace, worker_handle).await.is_err() {
        warn!(grace_ms = grace.as_millis() as u64, "Worker did not stop in time");
    }
    let _ = tokio::time::timeout(EXIT_MARGIN, maintenance_handle).await;

    pool.close().await;
    telemetry::shutdown();
    info!("Shutdown complete.");

    Ok(())
}

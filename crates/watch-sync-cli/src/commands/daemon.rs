use super::AppContext;
use crate::output::Output;
use color_eyre::Result;
use tracing::{error, info};

/// Runs until interrupted. The timer and an optional startup sync share the
/// scheduler's single run slot.
pub async fn run_daemon(no_startup_sync: bool, output: &Output) -> Result<()> {
    let app = AppContext::load()?;
    let scheduler = app.ledger.scheduler().clone();

    if app.config.sync.sync_on_startup && !no_startup_sync {
        info!(operation = "scheduler_startup", "Running initial sync on startup");
        match app.ledger.trigger_sync(None) {
            Ok(handle) => {
                tokio::spawn(async move {
                    match handle.wait().await {
                        Ok(report) => info!(
                            operation = "startup_sync_complete",
                            succeeded = report.succeeded(),
                            failed = report.failed(),
                            "Startup sync completed"
                        ),
                        Err(e) => error!(operation = "startup_sync_error", error = %e, "Startup sync failed"),
                    }
                });
            }
            Err(e) => error!(operation = "startup_sync_error", error = %e, "Startup sync not started"),
        }
    }

    let timer = scheduler.start_timer();
    if timer.is_none() && !app.config.sync.sync_on_startup {
        output.warn("sync.interval_minutes is 0; the daemon will not sync on its own");
    }
    info!(
        operation = "scheduler_started",
        interval_minutes = app.config.sync.interval_minutes,
        "Daemon started"
    );

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| color_eyre::eyre::eyre!("Failed to listen for shutdown signal: {}", e))?;

    if let Some(timer) = timer {
        timer.abort();
    }
    info!(operation = "scheduler_stopped", running = scheduler.is_running(), "Daemon shutting down");
    output.info("Daemon stopped");
    Ok(())
}

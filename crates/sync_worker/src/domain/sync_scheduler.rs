use crate::domain::{SyncEngine, SyncOutcome};
use common::domain::{ConnectionConfigRepository, SyncError, SyncTrigger};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Interval loop behind scheduled cycles. The poll interval is re-read from
/// the connection config before every sleep.
pub struct SyncScheduler {
    engine: Arc<SyncEngine>,
    config_repository: Arc<dyn ConnectionConfigRepository>,
    fallback_interval: Duration,
}

impl SyncScheduler {
    pub fn new(
        engine: Arc<SyncEngine>,
        config_repository: Arc<dyn ConnectionConfigRepository>,
        fallback_interval: Duration,
    ) -> Self {
        Self {
            engine,
            config_repository,
            fallback_interval,
        }
    }

    /// Runs until `ctx` is cancelled. Cancellation is only observed between
    /// cycles; a cycle in flight finishes first.
    pub async fn run(&self, ctx: CancellationToken) -> anyhow::Result<()> {
        info!(
            fallback_interval_secs = self.fallback_interval.as_secs(),
            "Sync scheduler started"
        );

        loop {
            if ctx.is_cancelled() {
                break;
            }

            self.tick().await;

            let interval = self.next_interval().await;
            debug!(interval_secs = interval.as_secs(), "Next scheduled sync");
            tokio::select! {
                _ = ctx.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        info!("Sync scheduler stopped");
        Ok(())
    }

    /// One scheduled cycle. Failures are logged, never returned.
    pub async fn tick(&self) {
        match self.engine.run(SyncTrigger::Scheduled).await {
            Ok(SyncOutcome::Completed(summary)) => {
                debug!(run_id = %summary.run_id, "Scheduled sync completed");
            }
            Ok(SyncOutcome::Failed { summary, error }) => {
                warn!(run_id = %summary.run_id, kind = error.kind(), "Scheduled sync failed");
            }
            Ok(SyncOutcome::AlreadyRunning { run_id, .. }) => {
                info!(running_run_id = ?run_id, "Skipped scheduled sync, a cycle is already running");
            }
            Err(SyncError::Config(e)) => {
                debug!(reason = %e, "Scheduled sync not started");
            }
            Err(e) => {
                error!(kind = e.kind(), error = %e, "Scheduled sync could not start");
            }
        }
    }

    async fn next_interval(&self) -> Duration {
        match self.config_repository.get_connection_config().await {
            Ok(Some(config)) if config.poll_interval_seconds > 0 => {
                Duration::from_secs(u64::from(config.poll_interval_seconds))
            }
            Ok(_) => self.fallback_interval,
            Err(e) => {
                warn!(error = %e, "Failed to read poll interval, using fallback");
                self.fallback_interval
            }
        }
    }
}

use crate::domain::{SyncEngine, SyncScheduler};
use common::domain::ConnectionConfigRepository;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct SyncWorkerConfig {
    /// Poll interval used while no connection config is stored
    pub fallback_poll_interval: Duration,
}

pub struct SyncWorker {
    scheduler: SyncScheduler,
}

impl SyncWorker {
    pub fn new(
        engine: Arc<SyncEngine>,
        config_repository: Arc<dyn ConnectionConfigRepository>,
        config: SyncWorkerConfig,
    ) -> Self {
        debug!("Initializing sync worker module");
        Self {
            scheduler: SyncScheduler::new(engine, config_repository, config.fallback_poll_interval),
        }
    }

    #[allow(clippy::type_complexity)]
    pub fn into_runner_process(
        self,
    ) -> Box<
        dyn FnOnce(
                CancellationToken,
            ) -> std::pin::Pin<
                Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send>,
            > + Send,
    > {
        Box::new({
            let scheduler = self.scheduler;
            move |ctx| Box::pin(async move { scheduler.run(ctx).await })
        })
    }
}

use crate::rest::{run_http_server, HttpServerConfig};
use std::sync::Arc;
use sync_worker::domain::SyncService;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct CheckinApi {
    service: Arc<SyncService>,
    config: HttpServerConfig,
}

impl CheckinApi {
    pub fn new(service: Arc<SyncService>, config: HttpServerConfig) -> Self {
        debug!("Initializing check-in API module");
        Self { service, config }
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
        Box::new(move |ctx| {
            Box::pin(async move { run_http_server(self.config, self.service, ctx).await })
        })
    }
}

use crate::rest::{
    get_sync_status, list_sync_runs, register_token, run_manual_sync, save_connection_config,
    test_connection,
};
use anyhow::Context;
use axum::routing::{get, post, put};
use axum::Router;
use common::http::{HttpLoggingConfig, HttpLoggingLayer, HttpTracingConfig, HttpTracingLayer};
use std::net::SocketAddr;
use std::sync::Arc;
use sync_worker::domain::SyncService;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// HTTP server configuration
pub struct HttpServerConfig {
    pub host: String,
    pub port: u16,
    pub logging_config: HttpLoggingConfig,
    pub tracing_config: HttpTracingConfig,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            logging_config: HttpLoggingConfig::default(),
            tracing_config: HttpTracingConfig::default(),
        }
    }
}

/// Routes for the four display operations plus config and history
pub fn build_router(service: Arc<SyncService>, config: &HttpServerConfig) -> Router {
    Router::new()
        .route("/api/v1/connection", put(save_connection_config))
        .route("/api/v1/connection/test", post(test_connection))
        .route("/api/v1/connection/token", post(register_token))
        .route("/api/v1/sync", post(run_manual_sync))
        .route("/api/v1/sync/status", get(get_sync_status))
        .route("/api/v1/sync/runs", get(list_sync_runs))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(service)
        .layer(HttpLoggingLayer::new(config.logging_config.clone()))
        .layer(HttpTracingLayer::new(config.tracing_config.clone()))
}

/// Run the HTTP server with graceful shutdown
pub async fn run_http_server(
    config: HttpServerConfig,
    service: Arc<SyncService>,
    cancellation_token: CancellationToken,
) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("Invalid server address {}:{}", config.host, config.port))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Starting HTTP server on {}", addr);

    let router = build_router(service, &config);
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        cancellation_token.cancelled().await;
        info!("HTTP server shutdown signal received");
    });

    match server.await {
        Ok(()) => {
            info!("HTTP server stopped gracefully");
            Ok(())
        }
        Err(e) => {
            error!("HTTP server error: {}", e);
            Err(e.into())
        }
    }
}

use crate::rest::api_response;
use axum::extract::State;
use axum::response::Response;
use axum::Json;
use chrono::{DateTime, Utc};
use common::domain::{ConnectionConfig, DeviceCredentials};
use serde::Serialize;
use std::sync::Arc;
use sync_worker::domain::{SaveConnectionConfigInput, SyncService};
use tracing::{debug, instrument};

/// Connection config as returned over HTTP. Secrets are reported as present
/// or absent, never echoed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionConfigView {
    pub base_url: String,
    pub enabled: bool,
    pub poll_interval_seconds: u32,
    pub username: Option<String>,
    pub token_present: bool,
    pub password_present: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<ConnectionConfig> for ConnectionConfigView {
    fn from(config: ConnectionConfig) -> Self {
        Self {
            token_present: config.token().is_some(),
            password_present: config.password.as_deref().is_some_and(|p| !p.is_empty()),
            base_url: config.base_url,
            enabled: config.enabled,
            poll_interval_seconds: config.poll_interval_seconds,
            username: config.username,
            updated_at: config.updated_at,
        }
    }
}

#[instrument(name = "SaveConnectionConfig", skip(service, input))]
pub async fn save_connection_config(
    State(service): State<Arc<SyncService>>,
    Json(input): Json<SaveConnectionConfigInput>,
) -> Response {
    let result = service
        .save_connection_config(input)
        .await
        .map(ConnectionConfigView::from);
    api_response(result)
}

#[instrument(name = "TestConnection", skip(service))]
pub async fn test_connection(State(service): State<Arc<SyncService>>) -> Response {
    api_response(service.test_connection().await)
}

/// An absent or unreadable body falls back to the stored credentials
#[instrument(name = "RegisterToken", skip(service, credentials))]
pub async fn register_token(
    State(service): State<Arc<SyncService>>,
    credentials: Option<Json<DeviceCredentials>>,
) -> Response {
    let credentials = credentials.map(|Json(c)| c);
    debug!(explicit_credentials = credentials.is_some(), "Registering device token");
    api_response(service.register_token(credentials).await)
}

use crate::rest::api_response;
use axum::extract::{Query, State};
use axum::response::Response;
use serde::Deserialize;
use std::sync::Arc;
use sync_worker::domain::SyncService;
use tracing::instrument;

const DEFAULT_RUN_LIMIT: usize = 20;

#[derive(Debug, Deserialize)]
pub struct ListRunsQuery {
    pub limit: Option<usize>,
}

#[instrument(name = "RunManualSync", skip(service))]
pub async fn run_manual_sync(State(service): State<Arc<SyncService>>) -> Response {
    api_response(service.run_manual_sync().await)
}

#[instrument(name = "GetSyncStatus", skip(service))]
pub async fn get_sync_status(State(service): State<Arc<SyncService>>) -> Response {
    api_response(service.get_sync_status().await)
}

#[instrument(name = "ListSyncRuns", skip(service))]
pub async fn list_sync_runs(
    State(service): State<Arc<SyncService>>,
    Query(query): Query<ListRunsQuery>,
) -> Response {
    let limit = query.limit.unwrap_or(DEFAULT_RUN_LIMIT);
    api_response(service.list_sync_runs(limit).await)
}

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use sync_worker::domain::ApiResult;

/// HTTP status for an `ApiError` kind
pub fn status_for_kind(kind: &str) -> StatusCode {
    match kind {
        "validation" => StatusCode::UNPROCESSABLE_ENTITY,
        "not_configured" | "disabled" | "token_missing" | "credentials_missing"
        | "already_running" => StatusCode::CONFLICT,
        "device_unreachable" | "device_unauthorized" | "device_bad_response" => {
            StatusCode::BAD_GATEWAY
        }
        "timeout" => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Render an `ApiResult` with the status its error kind implies
pub fn api_response<T: Serialize>(result: ApiResult<T>) -> Response {
    let status = result
        .error()
        .map(|e| status_for_kind(&e.kind))
        .unwrap_or(StatusCode::OK);
    (status, Json(result)).into_response()
}

use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use atrium_auth::GateError;
use atrium_core::RealtimeError;
use atrium_infra::{ApplyError, StoreError};

pub fn realtime_error_to_response(err: RealtimeError) -> axum::response::Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    match &err {
        // Never say which of "unknown" or "someone else's" it was.
        RealtimeError::NotFound => json_error(status, err.code(), "not found"),
        _ => json_error(status, err.code(), err.to_string()),
    }
}

pub fn gate_error_to_response(err: GateError) -> axum::response::Response {
    match err {
        GateError::Denied { .. } => json_error(StatusCode::FORBIDDEN, "policy_denied", err.to_string()),
        GateError::QuotaExceeded { .. } => {
            json_error(StatusCode::TOO_MANY_REQUESTS, "quota_exceeded", err.to_string())
        }
    }
}

pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    realtime_error_to_response(err.into())
}

pub fn apply_error_to_response(err: ApplyError) -> axum::response::Response {
    match err {
        ApplyError::Realtime(e) => realtime_error_to_response(e),
        ApplyError::Gate(e) => gate_error_to_response(e),
        ApplyError::Store(e) => store_error_to_response(e),
        ApplyError::TimelineAfterCommit { .. } => json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "timeline_unavailable",
            err.to_string(),
        ),
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

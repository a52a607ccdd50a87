use axum::{
    Json,
    body::Bytes,
    extract::{Extension, Path},
    response::{IntoResponse, Response},
};

use atrium_auth::RequestContext;
use atrium_core::RealtimeError;
use atrium_events::CommandEnvelope;

use super::common::parse_resource_id;
use crate::app::errors::{apply_error_to_response, realtime_error_to_response};
use crate::app::services::AppServices;

/// POST /canvases/:id/commands
///
/// Applied, conflict and rejected are all 200; the `status` field tells
/// them apart.
pub async fn apply_command(
    Extension(services): Extension<AppServices>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
    body: Bytes,
) -> Response {
    let services = match services.ready() {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let canvas_id = match parse_resource_id(id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let command: CommandEnvelope = match serde_json::from_slice(&body) {
        Ok(c) => c,
        Err(e) => {
            return realtime_error_to_response(RealtimeError::validation(format!(
                "invalid command envelope: {e}"
            )));
        }
    };
    if command.canvas_id != canvas_id {
        return realtime_error_to_response(RealtimeError::validation(format!(
            "envelope canvas_id '{}' does not match path '{canvas_id}'",
            command.canvas_id
        )));
    }

    match services.engine.apply(&ctx, command).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => apply_error_to_response(e),
    }
}

/// GET /canvases/:id/revision
pub async fn revision(
    Extension(services): Extension<AppServices>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> Response {
    let services = match services.ready() {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let canvas_id = match parse_resource_id(id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.engine.head(&ctx, &canvas_id).await {
        Ok(head) => Json(head).into_response(),
        Err(e) => apply_error_to_response(e),
    }
}

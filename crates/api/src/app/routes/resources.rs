use axum::{
    Json,
    extract::{Extension, Path},
    response::{IntoResponse, Response},
};

use atrium_auth::RequestContext;

use super::common::{parse_kind, parse_resource_id};
use crate::app::dto::RegisteredResponse;
use crate::app::errors::realtime_error_to_response;
use crate::app::services::AppServices;

/// POST /resources/:kind/:id
///
/// Claim a canvas or thread for the caller's tenant. Repeating the call is a
/// no-op; a resource owned by another tenant answers 404.
pub async fn register(
    Extension(services): Extension<AppServices>,
    Extension(ctx): Extension<RequestContext>,
    Path((kind, id)): Path<(String, String)>,
) -> Response {
    let services = match services.ready() {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let kind = match parse_kind(&kind) {
        Ok(k) => k,
        Err(resp) => return resp,
    };
    let resource_id = match parse_resource_id(id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.registry.register(&ctx.tenant_id, &resource_id, kind).await {
        Ok(()) => Json(RegisteredResponse {
            resource_id,
            kind,
            tenant_id: ctx.tenant_id,
        })
        .into_response(),
        Err(e) => realtime_error_to_response(e),
    }
}

use axum::{
    Json,
    body::Bytes,
    extract::{Extension, Path},
    response::{IntoResponse, Response},
};

use atrium_auth::RequestContext;
use atrium_core::{RealtimeError, ResourceKind, StreamId};
use atrium_events::LegacyMessage;
use atrium_infra::{UnknownResourcePolicy, timeline::TimelineStore};

use super::common::parse_resource_id;
use crate::app::dto::PublishedResponse;
use crate::app::errors::{realtime_error_to_response, store_error_to_response};
use crate::app::services::AppServices;

/// POST /threads/:id/messages
///
/// Accepts a plain `{text, role?, sender_id?, message_id?}` message, turns it
/// into a stream event and publishes it on the thread stream.
pub async fn post_message(
    Extension(services): Extension<AppServices>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
    body: Bytes,
) -> Response {
    let services = match services.ready() {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let thread_id = match parse_resource_id(id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let message: LegacyMessage = match serde_json::from_slice(&body) {
        Ok(m) => m,
        Err(e) => {
            return realtime_error_to_response(RealtimeError::validation(format!(
                "invalid message: {e}"
            )));
        }
    };

    let access = match services.options.unknown_resources {
        UnknownResourcePolicy::Deny => {
            services
                .registry
                .verify_access(&ctx.tenant_id, &thread_id, ResourceKind::Thread)
                .await
        }
        UnknownResourcePolicy::RegisterOnFirstWrite => {
            services
                .registry
                .register(&ctx.tenant_id, &thread_id, ResourceKind::Thread)
                .await
        }
    };
    if let Err(e) = access {
        return realtime_error_to_response(e);
    }

    let mut routing = ctx.routing_keys();
    routing.thread_id = Some(thread_id.clone());
    // Let the message say who wrote it (an agent reply, a system notice).
    if message.sender_id.is_some() || message.role.is_some() {
        routing.actor_id = None;
    }
    let event = match message.into_stream_event(routing, ctx.event_ids(), services.strictness()) {
        Ok(e) => e,
        Err(e) => return realtime_error_to_response(e),
    };

    let stream_id = StreamId::for_resource(ResourceKind::Thread, &thread_id);
    if let Err(e) = services.timeline.append(&stream_id, &event, &ctx).await {
        return store_error_to_response(e);
    }
    tracing::debug!(%stream_id, event_id = %event.event_id(), "message published");
    Json(PublishedResponse { stream_id, event }).into_response()
}

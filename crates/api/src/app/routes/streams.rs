//! Replay and live delivery of resource streams.
//!
//! `events` is a plain cursor read. `live` is SSE: the backlog after the
//! cursor first, then live events, with no gap and no duplicate in between.
//! A reconnecting browser's `Last-Event-ID` takes precedence over `?after=`.

use std::convert::Infallible;
use std::time::{Duration, Instant};

use axum::{
    Json,
    extract::{Extension, Path, Query},
    http::HeaderMap,
    response::{
        IntoResponse, Response,
        sse::{Event as SseEvent, KeepAlive, Sse},
    },
};
use tokio::sync::mpsc::{UnboundedSender, unbounded_channel};
use tokio_stream::wrappers::UnboundedReceiverStream;

use atrium_auth::RequestContext;
use atrium_core::{ResourceId, ResourceKind, StreamId};
use atrium_events::StreamEvent;
use atrium_infra::timeline::{ResumeFeed, TimelineStore};

use super::common::{parse_cursor, parse_kind, parse_resource_id};
use crate::app::dto::{AfterQuery, EventsResponse};
use crate::app::errors::{realtime_error_to_response, store_error_to_response};
use crate::app::services::{AppServices, Services};

const LAST_EVENT_ID: &str = "last-event-id";
const HEARTBEAT: Duration = Duration::from_secs(15);
const POLL: Duration = Duration::from_millis(1000);

/// GET /streams/:kind/:id/events?after=<event_id>
pub async fn list_events(
    Extension(services): Extension<AppServices>,
    Extension(ctx): Extension<RequestContext>,
    Path((kind, id)): Path<(String, String)>,
    Query(query): Query<AfterQuery>,
) -> Response {
    let services = match services.ready() {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let stream_id = match authorized_stream(services, &ctx, &kind, id).await {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let after = match parse_cursor(query.after.as_deref()) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    match services.timeline.list_after(&stream_id, after.as_ref()).await {
        Ok(events) => {
            let last_event_id = events.last().map(|e| e.event_id().clone()).or(after);
            Json(EventsResponse {
                stream_id,
                events,
                last_event_id,
            })
            .into_response()
        }
        Err(e) => store_error_to_response(e),
    }
}

/// GET /streams/:kind/:id/live?after=<event_id>
pub async fn live(
    Extension(services): Extension<AppServices>,
    Extension(ctx): Extension<RequestContext>,
    Path((kind, id)): Path<(String, String)>,
    Query(query): Query<AfterQuery>,
    headers: HeaderMap,
) -> Response {
    let services = match services.ready() {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let stream_id = match authorized_stream(services, &ctx, &kind, id).await {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let header_cursor = headers.get(LAST_EVENT_ID).and_then(|v| v.to_str().ok());
    let after = match parse_cursor(header_cursor.or(query.after.as_deref())) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let mut feed = match ResumeFeed::open(
        services.timeline.as_ref(),
        &*services.bus,
        ctx.tenant_id.clone(),
        stream_id,
        after.as_ref(),
    )
    .await
    {
        Ok(feed) => feed,
        Err(e) => return store_error_to_response(e),
    };

    let (tx, rx) = unbounded_channel::<Result<SseEvent, Infallible>>();

    // The bus subscription is blocking; drive it from a blocking thread.
    tokio::task::spawn_blocking(move || {
        for event in feed.take_backlog() {
            if !forward(&tx, &event) {
                return;
            }
        }

        let mut last_sent = Instant::now();
        loop {
            match feed.next_live(POLL) {
                Ok(Some(event)) => {
                    if !forward(&tx, &event) {
                        break;
                    }
                    last_sent = Instant::now();
                }
                Ok(None) => {
                    if last_sent.elapsed() > HEARTBEAT {
                        let heartbeat = SseEvent::default().event("heartbeat").data("{}");
                        if tx.send(Ok(heartbeat)).is_err() {
                            break;
                        }
                        last_sent = Instant::now();
                    }
                }
                Err(_closed) => break,
            }
        }
        tracing::debug!(stream_id = %feed.stream_id(), "live stream ended");
    });

    Sse::new(UnboundedReceiverStream::new(rx))
        .keep_alive(KeepAlive::new().interval(HEARTBEAT))
        .into_response()
}

/// Send one event; `false` once the client is gone.
fn forward(tx: &UnboundedSender<Result<SseEvent, Infallible>>, event: &StreamEvent) -> bool {
    let data = match serde_json::to_string(event) {
        Ok(data) => data,
        Err(e) => {
            tracing::warn!(event_id = %event.event_id(), error = %e, "event not serializable; skipped");
            return true;
        }
    };
    let sse = SseEvent::default()
        .id(event.event_id().as_str())
        .event(event.event_type())
        .data(data);
    tx.send(Ok(sse)).is_ok()
}

async fn authorized_stream(
    services: &Services,
    ctx: &RequestContext,
    kind: &str,
    id: String,
) -> Result<StreamId, Response> {
    let kind: ResourceKind = parse_kind(kind)?;
    let resource_id: ResourceId = parse_resource_id(id)?;
    services
        .registry
        .verify_access(&ctx.tenant_id, &resource_id, kind)
        .await
        .map_err(realtime_error_to_response)?;
    Ok(StreamId::for_resource(kind, &resource_id))
}

use serde::{Deserialize, Serialize};

use atrium_core::{EventId, ResourceId, ResourceKind, StreamId, TenantId};
use atrium_events::StreamEvent;

#[derive(Debug, Serialize)]
pub struct RegisteredResponse {
    pub resource_id: ResourceId,
    pub kind: ResourceKind,
    pub tenant_id: TenantId,
}

#[derive(Debug, Default, Deserialize)]
pub struct AfterQuery {
    #[serde(default)]
    pub after: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EventsResponse {
    pub stream_id: StreamId,
    pub events: Vec<StreamEvent>,
    /// Cursor to resume from: the last event returned, or the request's own
    /// cursor when nothing new arrived.
    pub last_event_id: Option<EventId>,
}

#[derive(Debug, Serialize)]
pub struct PublishedResponse {
    pub stream_id: StreamId,
    pub event: StreamEvent,
}

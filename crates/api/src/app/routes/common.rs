//! Path/query parsing shared by the handlers.

use axum::response::Response;

use atrium_core::{EventId, RealtimeError, ResourceId, ResourceKind};

use crate::app::errors::realtime_error_to_response;

pub fn parse_kind(raw: &str) -> Result<ResourceKind, Response> {
    raw.parse::<ResourceKind>().map_err(realtime_error_to_response)
}

pub fn parse_resource_id(raw: String) -> Result<ResourceId, Response> {
    ResourceId::new(raw).map_err(realtime_error_to_response)
}

/// A client cursor. Malformed text is a validation error; a well-formed
/// cursor the stream doesn't know is reported later as cursor-invalid.
pub fn parse_cursor(raw: Option<&str>) -> Result<Option<EventId>, Response> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(raw) => EventId::new(raw)
            .map(Some)
            .map_err(|e| realtime_error_to_response(RealtimeError::validation(format!("invalid cursor: {e}")))),
    }
}

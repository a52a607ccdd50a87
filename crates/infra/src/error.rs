use thiserror::Error;

use atrium_auth::GateError;
use atrium_core::{EventId, RealtimeError, StreamId};

/// Storage-layer failure shared by every backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error during {op}: {source}")]
    Io {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("backend not configured: {0}")]
    Unconfigured(String),

    #[error("cursor '{cursor}' is not part of stream '{stream_id}'")]
    CursorInvalid { stream_id: StreamId, cursor: EventId },

    /// The event's routing scope differs from the appending caller's.
    #[error("scope mismatch: {0}")]
    ScopeMismatch(String),

    #[error("event '{0}' already exists")]
    DuplicateEvent(EventId),

    #[error("event publication failed: {0}")]
    Publish(String),
}

impl StoreError {
    pub fn io(op: &'static str) -> impl FnOnce(std::io::Error) -> StoreError {
        move |source| StoreError::Io { op, source }
    }

    pub fn poisoned(what: &str) -> StoreError {
        StoreError::Backend(format!("{what} lock poisoned"))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        StoreError::Serialization(value.to_string())
    }
}

impl From<StoreError> for RealtimeError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::CursorInvalid { stream_id, cursor } => {
                RealtimeError::cursor_invalid(stream_id.as_str(), cursor.as_str())
            }
            StoreError::ScopeMismatch(msg) => RealtimeError::access_denied(msg),
            StoreError::DuplicateEvent(id) => {
                RealtimeError::validation(format!("event '{id}' already exists"))
            }
            other => RealtimeError::backend_unavailable(other.to_string()),
        }
    }
}

/// Failure of `CommandApplyEngine::apply`.
///
/// Conflicts and rejections are not here; they are `RevisionResult`s.
#[derive(Debug, Error)]
pub enum ApplyError {
    /// Validation, routing, isolation.
    #[error(transparent)]
    Realtime(#[from] RealtimeError),

    /// The policy gate's own error, passed through untouched.
    #[error(transparent)]
    Gate(#[from] GateError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The revision is durable but its event never reached the timeline.
    #[error("revision {revision} committed but timeline append failed: {source}")]
    TimelineAfterCommit {
        revision: u64,
        #[source]
        source: StoreError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_onto_the_caller_taxonomy() {
        let stream_id = StreamId::new("s1").unwrap();
        let cursor = EventId::new("bogus").unwrap();
        let err: RealtimeError = StoreError::CursorInvalid { stream_id, cursor }.into();
        assert_eq!(err.status_code(), 410);

        let err: RealtimeError = StoreError::ScopeMismatch("tenant".into()).into();
        assert_eq!(err.status_code(), 403);

        let err: RealtimeError = StoreError::Unconfigured("ATRIUM_TIMELINE_BACKEND".into()).into();
        assert_eq!(err.status_code(), 503);
    }
}

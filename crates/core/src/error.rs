//! Realtime error model.

use thiserror::Error;

/// Result type used across the realtime core.
pub type RealtimeResult<T> = Result<T, RealtimeError>;

/// Caller-facing error taxonomy.
///
/// Revision conflicts are deliberately absent: a conflict is a successful
/// outcome carried by a `RevisionResult`, not an error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RealtimeError {
    /// A value failed validation (malformed envelope, identifier, cursor...).
    #[error("validation failed: {0}")]
    Validation(String),

    /// The caller's context does not match the routing scope it addressed
    /// (tenant/env/project/mode mismatch).
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Unknown resource, or a resource owned by another tenant.
    ///
    /// Both cases share this variant so cross-tenant existence never leaks.
    #[error("not found")]
    NotFound,

    /// A replay cursor is not part of the stream; the client must fall back
    /// to a full snapshot.
    #[error("cursor '{cursor}' is not part of stream '{stream_id}'")]
    CursorInvalid { stream_id: String, cursor: String },

    /// Storage is misconfigured or unreachable. Fatal to the request only.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
}

impl RealtimeError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn access_denied(msg: impl Into<String>) -> Self {
        Self::AccessDenied(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    pub fn cursor_invalid(stream_id: impl Into<String>, cursor: impl Into<String>) -> Self {
        Self::CursorInvalid {
            stream_id: stream_id.into(),
            cursor: cursor.into(),
        }
    }

    pub fn backend_unavailable(msg: impl Into<String>) -> Self {
        Self::BackendUnavailable(msg.into())
    }

    /// HTTP-style status for transports.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::AccessDenied(_) => 403,
            Self::NotFound => 404,
            Self::CursorInvalid { .. } => 410,
            Self::BackendUnavailable(_) => 503,
        }
    }

    /// Stable machine-readable code for error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::AccessDenied(_) => "access_denied",
            Self::NotFound => "not_found",
            Self::CursorInvalid { .. } => "cursor_invalid",
            Self::BackendUnavailable(_) => "backend_unavailable",
        }
    }

    /// Whether the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_follows_transport_contract() {
        assert_eq!(RealtimeError::validation("x").status_code(), 400);
        assert_eq!(RealtimeError::access_denied("x").status_code(), 403);
        assert_eq!(RealtimeError::not_found().status_code(), 404);
        assert_eq!(RealtimeError::cursor_invalid("s1", "bogus").status_code(), 410);
        assert_eq!(RealtimeError::backend_unavailable("x").status_code(), 503);
    }

    #[test]
    fn only_backend_errors_are_retryable() {
        assert!(RealtimeError::backend_unavailable("down").is_retryable());
        assert!(!RealtimeError::not_found().is_retryable());
        assert!(!RealtimeError::cursor_invalid("s1", "c").is_retryable());
    }
}

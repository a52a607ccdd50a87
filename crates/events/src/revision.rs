//! Revision bookkeeping types shared by the revision store, the apply engine
//! and the API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use atrium_core::{EventId, ResourceId};

use crate::command::CanvasOp;

/// Reason attached to a result returned from the idempotency map.
pub const IDEMPOTENT_REPLAY_REASON: &str = "Idempotent replay";

/// Head of a canvas. Created lazily at revision 0 on first access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanvasRevision {
    pub canvas_id: ResourceId,
    pub head_rev: u64,
    pub updated_at: DateTime<Utc>,
}

impl CanvasRevision {
    pub fn initial(canvas_id: ResourceId) -> Self {
        Self {
            canvas_id,
            head_rev: 0,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevisionStatus {
    Applied,
    /// `base_rev` was stale. Not an error: the result carries recovery ops.
    Conflict,
    /// Well-formed but unsupported command; nothing was recorded.
    Rejected,
}

/// One committed batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpLogEntry {
    pub revision: u64,
    pub ops: Vec<CanvasOp>,
    pub command_id: String,
    pub event_id: EventId,
    pub committed_at: DateTime<Utc>,
}

/// Outcome of applying a command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionResult {
    pub status: RevisionStatus,
    pub current_rev: u64,
    /// The `base_rev` the client sent.
    pub your_rev: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<EventId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recovery_ops: Vec<OpLogEntry>,
}

impl RevisionResult {
    pub fn applied(current_rev: u64, your_rev: u64, event_id: EventId) -> Self {
        Self {
            status: RevisionStatus::Applied,
            current_rev,
            your_rev,
            reason: None,
            event_id: Some(event_id),
            recovery_ops: Vec::new(),
        }
    }

    pub fn conflict(current_rev: u64, your_rev: u64, recovery_ops: Vec<OpLogEntry>) -> Self {
        Self {
            status: RevisionStatus::Conflict,
            current_rev,
            your_rev,
            reason: Some(format!(
                "base_rev {your_rev} does not match head {current_rev}"
            )),
            event_id: None,
            recovery_ops,
        }
    }

    pub fn rejected(current_rev: u64, your_rev: u64, reason: impl Into<String>) -> Self {
        Self {
            status: RevisionStatus::Rejected,
            current_rev,
            your_rev,
            reason: Some(reason.into()),
            event_id: None,
            recovery_ops: Vec::new(),
        }
    }

    /// The stored result of an earlier apply, re-issued for a retried request.
    pub fn as_idempotent_replay(&self) -> Self {
        Self {
            reason: Some(IDEMPOTENT_REPLAY_REASON.to_string()),
            ..self.clone()
        }
    }

    pub fn is_applied(&self) -> bool {
        self.status == RevisionStatus::Applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idempotent_replay_keeps_revision_and_event() {
        let event_id = EventId::generate();
        let first = RevisionResult::applied(1, 0, event_id.clone());
        let replay = first.as_idempotent_replay();
        assert_eq!(replay.status, RevisionStatus::Applied);
        assert_eq!(replay.current_rev, 1);
        assert_eq!(replay.event_id, Some(event_id));
        assert_eq!(replay.reason.as_deref(), Some(IDEMPOTENT_REPLAY_REASON));
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_value(RevisionResult::conflict(10, 9, Vec::new())).unwrap();
        assert_eq!(json["status"], "conflict");
        assert_eq!(json["current_rev"], 10);
        assert_eq!(json["your_rev"], 9);
    }
}

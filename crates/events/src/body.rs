//! Typed event payloads, keyed by the event `type`.

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value as JsonValue;

use atrium_core::{RealtimeError, ResourceId};

use crate::command::CanvasOp;

/// A command batch was committed to a canvas.
pub const CANVAS_OPS_APPLIED: &str = "canvas.ops_applied";
/// A chat/thread message.
pub const CHAT_MESSAGE: &str = "chat.message";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasOpsApplied {
    pub canvas_id: ResourceId,
    pub revision: u64,
    pub command_id: String,
    pub ops: Vec<CanvasOp>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

/// Event payload.
///
/// Known types are validated into typed structs; anything else is carried as
/// `Opaque` and written back byte-for-byte equivalent.
#[derive(Debug, Clone, PartialEq)]
pub enum EventBody {
    CanvasOpsApplied(CanvasOpsApplied),
    ChatMessage(ChatMessage),
    Opaque { kind: String, data: JsonValue },
}

impl EventBody {
    pub fn kind(&self) -> &str {
        match self {
            EventBody::CanvasOpsApplied(_) => CANVAS_OPS_APPLIED,
            EventBody::ChatMessage(_) => CHAT_MESSAGE,
            EventBody::Opaque { kind, .. } => kind,
        }
    }

    pub fn opaque(kind: impl Into<String>, data: JsonValue) -> Self {
        EventBody::Opaque {
            kind: kind.into(),
            data,
        }
    }

    /// Validate and type a raw `(type, data)` pair.
    pub fn from_parts(kind: String, data: JsonValue) -> Result<Self, RealtimeError> {
        if kind.trim().is_empty() {
            return Err(RealtimeError::validation("event type must not be empty"));
        }
        let invalid = |e: serde_json::Error| {
            RealtimeError::validation(format!("invalid '{kind}' payload: {e}"))
        };
        match kind.as_str() {
            CANVAS_OPS_APPLIED => serde_json::from_value(data)
                .map(EventBody::CanvasOpsApplied)
                .map_err(invalid),
            CHAT_MESSAGE => serde_json::from_value(data)
                .map(EventBody::ChatMessage)
                .map_err(invalid),
            _ => Ok(EventBody::Opaque { kind, data }),
        }
    }
}

/// Serializes only the `data` part of a body.
pub(crate) struct BodyData<'a>(pub(crate) &'a EventBody);

impl Serialize for BodyData<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            EventBody::CanvasOpsApplied(p) => p.serialize(serializer),
            EventBody::ChatMessage(p) => p.serialize(serializer),
            EventBody::Opaque { data, .. } => data.serialize(serializer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn known_types_are_typed() {
        let body = EventBody::from_parts(
            CHAT_MESSAGE.to_string(),
            json!({"text": "hi", "role": "user"}),
        )
        .unwrap();
        assert!(matches!(body, EventBody::ChatMessage(ref m) if m.text == "hi"));
    }

    #[test]
    fn known_type_with_wrong_shape_is_rejected() {
        let err = EventBody::from_parts(CANVAS_OPS_APPLIED.to_string(), json!({"revision": "x"}))
            .unwrap_err();
        assert!(matches!(err, RealtimeError::Validation(_)));
    }

    #[test]
    fn unknown_types_round_trip_untouched() {
        let data = json!({"nested": {"k": [1, "two", null]}});
        let body = EventBody::from_parts("mesh.generated".to_string(), data.clone()).unwrap();
        assert_eq!(body.kind(), "mesh.generated");
        assert_eq!(serde_json::to_value(BodyData(&body)).unwrap(), data);
    }
}

//! Adapter turning plain text messages from older clients into
//! [`StreamEvent`]s.

use serde::Deserialize;
use serde_json::Value as JsonValue;

use atrium_core::RealtimeError;

use crate::body::{ChatMessage, EventBody};
use crate::envelope::{EventIds, StreamEvent, Strictness};
use crate::routing::{ActorType, RoutingKeys};

/// A message as posted by a client that does not speak the envelope format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LegacyMessage {
    pub text: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub sender_id: Option<String>,
    #[serde(default)]
    pub message_id: Option<String>,
}

/// Guess who produced a message.
///
/// The role wins when it is recognised; otherwise well-known sender-id
/// prefixes are used, and anything else is a human.
pub fn infer_actor_type(role: Option<&str>, sender_id: Option<&str>) -> ActorType {
    if let Some(role) = role {
        match role.trim().to_ascii_lowercase().as_str() {
            "assistant" | "agent" | "bot" | "ai" | "model" | "tool" => return ActorType::Agent,
            "system" => return ActorType::System,
            "user" | "human" => return ActorType::Human,
            _ => {}
        }
    }

    let Some(sender) = sender_id.map(|s| s.trim().to_ascii_lowercase()) else {
        return ActorType::Human;
    };
    if sender.starts_with("system") {
        ActorType::System
    } else if ["agent:", "agent-", "bot-", "ai-", "assistant"]
        .iter()
        .any(|prefix| sender.starts_with(prefix))
    {
        ActorType::Agent
    } else {
        ActorType::Human
    }
}

/// Unwrap text that is itself an encoded `{"type": .., "data": ..}` body.
fn pre_encoded_body(text: &str) -> Option<EventBody> {
    let trimmed = text.trim();
    if !trimmed.starts_with('{') {
        return None;
    }
    let JsonValue::Object(mut map) = serde_json::from_str::<JsonValue>(trimmed).ok()? else {
        return None;
    };
    let kind = match map.get("type") {
        Some(JsonValue::String(kind)) => kind.clone(),
        _ => return None,
    };
    let data = map.remove("data")?;
    EventBody::from_parts(kind, data).ok()
}

impl LegacyMessage {
    /// Build a stream event scoped to `routing`.
    ///
    /// The actor is taken from the message when the routing keys don't name
    /// one. The self-cursor is stamped by the builder.
    pub fn into_stream_event(
        self,
        mut routing: RoutingKeys,
        ids: EventIds,
        strictness: Strictness,
    ) -> Result<StreamEvent, RealtimeError> {
        if routing.actor_id.is_none() {
            routing.actor_type = infer_actor_type(self.role.as_deref(), self.sender_id.as_deref());
            routing.actor_id = self.sender_id.clone();
        }

        let body = pre_encoded_body(&self.text).unwrap_or_else(|| {
            EventBody::ChatMessage(ChatMessage {
                text: self.text,
                role: self.role,
                sender_id: self.sender_id,
                message_id: self.message_id,
            })
        });

        StreamEvent::builder(routing, body).ids(ids).build(strictness)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::CHAT_MESSAGE;
    use crate::routing::Env;
    use atrium_core::TenantId;
    use serde_json::json;

    fn routing() -> RoutingKeys {
        RoutingKeys::new(TenantId::new("t_A").unwrap(), Env::Dev)
    }

    fn message(text: &str, role: Option<&str>, sender: Option<&str>) -> LegacyMessage {
        LegacyMessage {
            text: text.to_string(),
            role: role.map(str::to_string),
            sender_id: sender.map(str::to_string),
            message_id: None,
        }
    }

    #[test]
    fn actor_type_from_role_then_sender() {
        assert_eq!(infer_actor_type(Some("assistant"), None), ActorType::Agent);
        assert_eq!(infer_actor_type(Some("System"), Some("u1")), ActorType::System);
        assert_eq!(infer_actor_type(Some("user"), Some("bot-7")), ActorType::Human);
        assert_eq!(infer_actor_type(None, Some("bot-7")), ActorType::Agent);
        assert_eq!(infer_actor_type(Some("other"), Some("system:cron")), ActorType::System);
        assert_eq!(infer_actor_type(None, Some("alice")), ActorType::Human);
        assert_eq!(infer_actor_type(None, None), ActorType::Human);
    }

    #[test]
    fn plain_text_becomes_a_chat_message() {
        let event = message("hello", Some("assistant"), Some("agent:planner"))
            .into_stream_event(routing(), EventIds::default(), Strictness::Lenient)
            .unwrap();
        assert_eq!(event.event_type(), CHAT_MESSAGE);
        assert_eq!(event.routing().actor_type, ActorType::Agent);
        assert_eq!(event.routing().actor_id.as_deref(), Some("agent:planner"));
        assert_eq!(event.meta().last_event_id.as_ref(), Some(event.event_id()));
    }

    #[test]
    fn pre_encoded_envelopes_are_unwrapped() {
        let text = json!({"type": "canvas.snapshot", "data": {"nodes": 3}}).to_string();
        let event = message(&text, None, None)
            .into_stream_event(routing(), EventIds::default(), Strictness::Lenient)
            .unwrap();
        assert_eq!(event.event_type(), "canvas.snapshot");
        assert_eq!(
            event.body(),
            &EventBody::opaque("canvas.snapshot", json!({"nodes": 3}))
        );
    }

    #[test]
    fn json_without_type_and_data_stays_text() {
        for text in [r#"{"type": "x"}"#, r#"{"data": 1}"#, "{not json", r#"{"type": 3, "data": 1}"#] {
            let event = message(text, None, None)
                .into_stream_event(routing(), EventIds::default(), Strictness::Lenient)
                .unwrap();
            assert!(
                matches!(event.body(), EventBody::ChatMessage(m) if m.text == text),
                "{text} should stay a chat message"
            );
        }
    }

    #[test]
    fn explicit_routing_actor_is_kept() {
        let routing = routing().with_actor("u1", ActorType::Human);
        let event = message("hi", Some("assistant"), Some("bot-1"))
            .into_stream_event(routing, EventIds::default(), Strictness::Lenient)
            .unwrap();
        assert_eq!(event.routing().actor_type, ActorType::Human);
        assert_eq!(event.routing().actor_id.as_deref(), Some("u1"));
    }
}

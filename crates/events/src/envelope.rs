use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value as JsonValue;

use atrium_core::{EventId, RealtimeError};

use crate::body::{BodyData, EventBody};
use crate::routing::RoutingKeys;

/// Current wire schema version (`v`).
pub const SCHEMA_VERSION: u32 = 1;

/// Request/run correlation identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventIds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

/// Whether an event is appended to the timeline before it is broadcast.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistencePolicy {
    #[default]
    Durable,
    /// Live delivery only; never appended, never replayed.
    Ephemeral,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageClass {
    Hot,
    Warm,
    Cold,
}

/// Delivery/storage metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMeta {
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub persist: PersistencePolicy,
    /// Self-cursor: always the event's own id once built.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_event_id: Option<EventId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<StorageClass>,
}

/// How much of the envelope must be present at construction.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum Strictness {
    #[default]
    Lenient,
    /// Requires routing.mode, ids.request_id/run_id/step_id, trace_id and
    /// meta.schema_version/severity/storage_class.
    Strict,
}

/// Canonical wire envelope for every replayed or live event.
///
/// Immutable once built: there are no setters, and `event_id` is assigned
/// exactly once by the builder.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawStreamEvent")]
pub struct StreamEvent {
    v: u32,
    event_id: EventId,
    ts: DateTime<Utc>,
    seq: Option<u64>,
    trace_id: Option<String>,
    span_id: Option<String>,
    ids: EventIds,
    routing: RoutingKeys,
    body: EventBody,
    meta: EventMeta,
}

impl StreamEvent {
    pub fn builder(routing: RoutingKeys, body: EventBody) -> StreamEventBuilder {
        StreamEventBuilder {
            event_id: None,
            ts: None,
            seq: None,
            trace_id: None,
            span_id: None,
            ids: EventIds::default(),
            routing,
            body,
            meta: EventMeta::default(),
        }
    }

    pub fn schema_version(&self) -> u32 {
        self.v
    }

    pub fn event_id(&self) -> &EventId {
        &self.event_id
    }

    pub fn event_type(&self) -> &str {
        self.body.kind()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.ts
    }

    pub fn sequence(&self) -> Option<u64> {
        self.seq
    }

    pub fn trace_id(&self) -> Option<&str> {
        self.trace_id.as_deref()
    }

    pub fn span_id(&self) -> Option<&str> {
        self.span_id.as_deref()
    }

    pub fn ids(&self) -> &EventIds {
        &self.ids
    }

    pub fn routing(&self) -> &RoutingKeys {
        &self.routing
    }

    pub fn body(&self) -> &EventBody {
        &self.body
    }

    pub fn meta(&self) -> &EventMeta {
        &self.meta
    }

    pub fn is_durable(&self) -> bool {
        self.meta.persist == PersistencePolicy::Durable
    }

    /// Names of strict-mode fields this event is missing.
    pub fn missing_strict_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.routing.mode.is_none() {
            missing.push("routing.mode");
        }
        if self.ids.request_id.is_none() {
            missing.push("ids.request_id");
        }
        if self.ids.run_id.is_none() {
            missing.push("ids.run_id");
        }
        if self.ids.step_id.is_none() {
            missing.push("ids.step_id");
        }
        if self.trace_id.is_none() {
            missing.push("trace_id");
        }
        if self.meta.schema_version.is_none() {
            missing.push("meta.schema_version");
        }
        if self.meta.severity.is_none() {
            missing.push("meta.severity");
        }
        if self.meta.storage_class.is_none() {
            missing.push("meta.storage_class");
        }
        missing
    }
}

pub struct StreamEventBuilder {
    event_id: Option<EventId>,
    ts: Option<DateTime<Utc>>,
    seq: Option<u64>,
    trace_id: Option<String>,
    span_id: Option<String>,
    ids: EventIds,
    routing: RoutingKeys,
    body: EventBody,
    meta: EventMeta,
}

impl StreamEventBuilder {
    pub fn event_id(mut self, event_id: EventId) -> Self {
        self.event_id = Some(event_id);
        self
    }

    pub fn occurred_at(mut self, ts: DateTime<Utc>) -> Self {
        self.ts = Some(ts);
        self
    }

    pub fn sequence(mut self, seq: u64) -> Self {
        self.seq = Some(seq);
        self
    }

    pub fn trace(mut self, trace_id: impl Into<String>, span_id: Option<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self.span_id = span_id;
        self
    }

    pub fn ids(mut self, ids: EventIds) -> Self {
        self.ids = ids;
        self
    }

    pub fn meta(mut self, meta: EventMeta) -> Self {
        self.meta = meta;
        self
    }

    /// Assign the event id (generating one if none was given), stamp the
    /// self-cursor and enforce `strictness`.
    pub fn build(self, strictness: Strictness) -> Result<StreamEvent, RealtimeError> {
        let event_id = self.event_id.unwrap_or_else(EventId::generate);
        let mut meta = self.meta;
        meta.last_event_id = Some(event_id.clone());

        let event = StreamEvent {
            v: SCHEMA_VERSION,
            event_id,
            ts: self.ts.unwrap_or_else(Utc::now),
            seq: self.seq,
            trace_id: self.trace_id,
            span_id: self.span_id,
            ids: self.ids,
            routing: self.routing,
            body: self.body,
            meta,
        };

        if strictness == Strictness::Strict {
            let missing = event.missing_strict_fields();
            if !missing.is_empty() {
                return Err(RealtimeError::validation(format!(
                    "strict event is missing: {}",
                    missing.join(", ")
                )));
            }
        }

        Ok(event)
    }
}

#[derive(Deserialize)]
struct RawStreamEvent {
    v: u32,
    #[serde(rename = "type")]
    kind: String,
    ts: DateTime<Utc>,
    #[serde(default)]
    seq: Option<u64>,
    event_id: EventId,
    #[serde(default)]
    trace_id: Option<String>,
    #[serde(default)]
    span_id: Option<String>,
    #[serde(default)]
    ids: EventIds,
    routing: RoutingKeys,
    #[serde(default)]
    data: JsonValue,
    #[serde(default)]
    meta: EventMeta,
}

impl TryFrom<RawStreamEvent> for StreamEvent {
    type Error = RealtimeError;

    fn try_from(raw: RawStreamEvent) -> Result<Self, Self::Error> {
        if raw.v == 0 || raw.v > SCHEMA_VERSION {
            return Err(RealtimeError::validation(format!(
                "unsupported event schema version {}",
                raw.v
            )));
        }
        let body = EventBody::from_parts(raw.kind, raw.data)?;
        let mut meta = raw.meta;
        meta.last_event_id = Some(raw.event_id.clone());

        Ok(StreamEvent {
            v: raw.v,
            event_id: raw.event_id,
            ts: raw.ts,
            seq: raw.seq,
            trace_id: raw.trace_id,
            span_id: raw.span_id,
            ids: raw.ids,
            routing: raw.routing,
            body,
            meta,
        })
    }
}

impl Serialize for StreamEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("StreamEvent", 11)?;
        s.serialize_field("v", &self.v)?;
        s.serialize_field("type", self.body.kind())?;
        s.serialize_field("ts", &self.ts)?;
        if let Some(seq) = self.seq {
            s.serialize_field("seq", &seq)?;
        }
        s.serialize_field("event_id", &self.event_id)?;
        if let Some(trace_id) = &self.trace_id {
            s.serialize_field("trace_id", trace_id)?;
        }
        if let Some(span_id) = &self.span_id {
            s.serialize_field("span_id", span_id)?;
        }
        s.serialize_field("ids", &self.ids)?;
        s.serialize_field("routing", &self.routing)?;
        s.serialize_field("data", &BodyData(&self.body))?;
        s.serialize_field("meta", &self.meta)?;
        s.end()
    }
}

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value as JsonValue;

use atrium_core::{RealtimeError, ResourceId};

use crate::routing::RoutingKeys;

/// Command type applying a batch of canvas operations.
pub const APPLY_OPS: &str = "canvas.apply_ops";

const MAX_COMMAND_ID_LEN: usize = 128;
const MAX_IDEMPOTENCY_KEY_LEN: usize = 256;

/// A single canvas mutation.
///
/// The engine treats ops as opaque facts once validated; they are stored in
/// the op log verbatim and handed back as recovery ops on conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum CanvasOp {
    AddNode {
        node_id: String,
        #[serde(default)]
        props: JsonValue,
    },
    UpdateNode {
        node_id: String,
        patch: JsonValue,
    },
    RemoveNode {
        node_id: String,
    },
    AddEdge {
        edge_id: String,
        from: String,
        to: String,
    },
    RemoveEdge {
        edge_id: String,
    },
}

impl CanvasOp {
    fn validate(&self) -> Result<(), RealtimeError> {
        let ids: Vec<&str> = match self {
            CanvasOp::AddNode { node_id, .. }
            | CanvasOp::UpdateNode { node_id, .. }
            | CanvasOp::RemoveNode { node_id } => vec![node_id.as_str()],
            CanvasOp::AddEdge { edge_id, from, to } => {
                vec![edge_id.as_str(), from.as_str(), to.as_str()]
            }
            CanvasOp::RemoveEdge { edge_id } => vec![edge_id.as_str()],
        };
        if ids.iter().any(|id| id.trim().is_empty()) {
            return Err(RealtimeError::validation("canvas op ids must not be empty"));
        }
        Ok(())
    }
}

/// Typed command payload, keyed by the envelope's `type`.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandPayload {
    /// `canvas.apply_ops`
    ApplyOps { ops: Vec<CanvasOp> },
    /// Any other command type, kept verbatim for forward compatibility.
    Opaque { kind: String, args: JsonValue },
}

#[derive(Deserialize)]
struct ApplyOpsArgs {
    ops: Vec<CanvasOp>,
}

impl CommandPayload {
    pub fn kind(&self) -> &str {
        match self {
            CommandPayload::ApplyOps { .. } => APPLY_OPS,
            CommandPayload::Opaque { kind, .. } => kind,
        }
    }

    /// Validate and type a raw `(type, args)` pair.
    pub fn from_parts(kind: String, args: JsonValue) -> Result<Self, RealtimeError> {
        if kind.trim().is_empty() {
            return Err(RealtimeError::validation("command type must not be empty"));
        }
        match kind.as_str() {
            APPLY_OPS => {
                let parsed: ApplyOpsArgs = serde_json::from_value(args).map_err(|e| {
                    RealtimeError::validation(format!("invalid {APPLY_OPS} args: {e}"))
                })?;
                for op in &parsed.ops {
                    op.validate()?;
                }
                Ok(CommandPayload::ApplyOps { ops: parsed.ops })
            }
            _ => Ok(CommandPayload::Opaque { kind, args }),
        }
    }

    fn serialize_args<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CommandPayload::ApplyOps { ops } => {
                let mut s = serializer.serialize_struct("ApplyOpsArgs", 1)?;
                s.serialize_field("ops", ops)?;
                s.end()
            }
            CommandPayload::Opaque { args, .. } => args.serialize(serializer),
        }
    }
}

struct PayloadArgs<'a>(&'a CommandPayload);

impl Serialize for PayloadArgs<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize_args(serializer)
    }
}

/// A client command addressed to one canvas.
///
/// Wire shape:
///
/// ```json
/// {"command_id":"cmd-1","type":"canvas.apply_ops","canvas_id":"c1","base_rev":0,
///  "idempotency_key":"k1","args":{"ops":[...]},"routing":{"tenant_id":"t_A"}}
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawCommandEnvelope")]
pub struct CommandEnvelope {
    pub command_id: String,
    pub canvas_id: ResourceId,
    /// Head revision the client built this command against.
    pub base_rev: u64,
    /// Scoped per canvas: `(canvas_id, idempotency_key)`.
    pub idempotency_key: Option<String>,
    pub payload: CommandPayload,
    pub routing: RoutingKeys,
}

#[derive(Deserialize)]
struct RawCommandEnvelope {
    #[serde(alias = "id")]
    command_id: String,
    #[serde(rename = "type")]
    kind: String,
    canvas_id: ResourceId,
    base_rev: u64,
    #[serde(default)]
    idempotency_key: Option<String>,
    #[serde(default)]
    args: JsonValue,
    routing: RoutingKeys,
}

impl TryFrom<RawCommandEnvelope> for CommandEnvelope {
    type Error = RealtimeError;

    fn try_from(raw: RawCommandEnvelope) -> Result<Self, Self::Error> {
        let payload = CommandPayload::from_parts(raw.kind, raw.args)?;
        let envelope = CommandEnvelope {
            command_id: raw.command_id,
            canvas_id: raw.canvas_id,
            base_rev: raw.base_rev,
            idempotency_key: raw.idempotency_key,
            payload,
            routing: raw.routing,
        };
        envelope.validate()?;
        Ok(envelope)
    }
}

impl CommandEnvelope {
    /// Structural validation (no state lookups).
    pub fn validate(&self) -> Result<(), RealtimeError> {
        if self.command_id.trim().is_empty() || self.command_id.len() > MAX_COMMAND_ID_LEN {
            return Err(RealtimeError::validation(format!(
                "command_id must be 1..={MAX_COMMAND_ID_LEN} bytes"
            )));
        }
        if let Some(key) = &self.idempotency_key {
            if key.trim().is_empty() || key.len() > MAX_IDEMPOTENCY_KEY_LEN {
                return Err(RealtimeError::validation(format!(
                    "idempotency_key must be 1..={MAX_IDEMPOTENCY_KEY_LEN} bytes"
                )));
            }
        }
        if let Some(routed) = &self.routing.canvas_id {
            if routed != &self.canvas_id {
                return Err(RealtimeError::validation(format!(
                    "routing.canvas_id '{routed}' does not match canvas_id '{}'",
                    self.canvas_id
                )));
            }
        }
        Ok(())
    }

    pub fn kind(&self) -> &str {
        self.payload.kind()
    }
}

impl Serialize for CommandEnvelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("CommandEnvelope", 7)?;
        s.serialize_field("command_id", &self.command_id)?;
        s.serialize_field("type", self.payload.kind())?;
        s.serialize_field("canvas_id", &self.canvas_id)?;
        s.serialize_field("base_rev", &self.base_rev)?;
        s.serialize_field("idempotency_key", &self.idempotency_key)?;
        s.serialize_field("args", &PayloadArgs(&self.payload))?;
        s.serialize_field("routing", &self.routing)?;
        s.end()
    }
}

//! Wire contracts of the realtime core: routing keys, the stream event
//! envelope, commands, revision results and the live bus.

pub mod body;
pub mod bus;
pub mod command;
pub mod envelope;
pub mod in_memory_bus;
pub mod legacy;
pub mod revision;
pub mod routing;
pub mod tenant;

pub use body::{CANVAS_OPS_APPLIED, CHAT_MESSAGE, CanvasOpsApplied, ChatMessage, EventBody};
pub use bus::{EventBus, LiveEvent, Subscription};
pub use command::{APPLY_OPS, CanvasOp, CommandEnvelope, CommandPayload};
pub use envelope::{
    EventIds, EventMeta, PersistencePolicy, Priority, SCHEMA_VERSION, Severity, StorageClass,
    StreamEvent, StreamEventBuilder, Strictness,
};
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use legacy::{LegacyMessage, infer_actor_type};
pub use revision::{
    CanvasRevision, IDEMPOTENT_REPLAY_REASON, OpLogEntry, RevisionResult, RevisionStatus,
};
pub use routing::{ActorType, Env, RoutingKeys};
pub use tenant::TenantScoped;

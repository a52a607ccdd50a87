//! Canvas command apply pipeline.
//!
//! ```text
//! CommandEnvelope
//!   ↓
//! 1. Structural validation, routing check (tenant/env)
//!   ↓
//! 2. Ownership: unknown or foreign canvas is NotFound
//!   ↓
//! 3. Policy gate ("canvas.apply")
//!   ↓
//! 4. Per-canvas lock  ──────────────────────────────┐
//!   ↓                                               │
//!    Republish revisions missing from the timeline  │
//!   ↓                                               │
//! 5. Idempotency map hit  → prior result, replayed  │ serialized
//!   ↓                                               │ per canvas
//! 6. base_rev != head     → conflict + recovery ops │
//!   ↓                                               │
//! 7. Commit op batch (head + 1), append event  ─────┘
//!   ↓
//! RevisionResult
//! ```
//!
//! Conflicts and rejections are ordinary `RevisionResult`s. Everything that
//! can fail the request happens before step 7, so an error means nothing was
//! written, with one exception: `ApplyError::TimelineAfterCommit`, where the
//! revision is durable but its event could not be appended. The next apply on
//! that canvas (typically the client's retry) appends the missing events
//! before doing anything else, so the stream never keeps a gap.

use std::str::FromStr;
use std::sync::Arc;

use atrium_auth::{GateRequest, PolicyGate, RequestContext};
use atrium_core::{EventId, RealtimeError, ResourceId, ResourceKind, StreamId};
use atrium_events::{
    CanvasOp, CanvasOpsApplied, CanvasRevision, CommandEnvelope, CommandPayload, EventBody,
    EventIds, EventMeta, RevisionResult, RoutingKeys, SCHEMA_VERSION, Severity, StorageClass,
    StreamEvent, Strictness,
};

use crate::error::{ApplyError, StoreError};
use crate::isolation::IsolationRegistry;
use crate::locks::ResourceLocks;
use crate::revision::{Commit, CommitOutcome, RevisionStore};
use crate::timeline::{TimelineStore, check_scope};

pub const APPLY_ACTION: &str = "canvas.apply";

/// What to do with a command addressed to a canvas nobody registered.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum UnknownResourcePolicy {
    /// Answer `NotFound`, exactly as for a foreign canvas.
    #[default]
    Deny,
    /// Register the canvas under the caller's tenant, then apply.
    RegisterOnFirstWrite,
}

impl FromStr for UnknownResourcePolicy {
    type Err = RealtimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deny" => Ok(Self::Deny),
            "register_on_first_write" => Ok(Self::RegisterOnFirstWrite),
            other => Err(RealtimeError::validation(format!(
                "unknown resource policy '{other}' (expected deny or register_on_first_write)"
            ))),
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Build committed events in strict mode.
    pub strict_events: bool,
    pub unknown_resources: UnknownResourcePolicy,
}

#[derive(Clone)]
pub struct CommandApplyEngine {
    registry: IsolationRegistry,
    gate: Arc<dyn PolicyGate>,
    revisions: Arc<dyn RevisionStore>,
    timeline: Arc<dyn TimelineStore>,
    locks: ResourceLocks<ResourceId>,
    options: ApplyOptions,
}

impl CommandApplyEngine {
    pub fn new(
        registry: IsolationRegistry,
        gate: Arc<dyn PolicyGate>,
        revisions: Arc<dyn RevisionStore>,
        timeline: Arc<dyn TimelineStore>,
    ) -> Self {
        Self {
            registry,
            gate,
            revisions,
            timeline,
            locks: ResourceLocks::new(),
            options: ApplyOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ApplyOptions) -> Self {
        self.options = options;
        self
    }

    pub fn registry(&self) -> &IsolationRegistry {
        &self.registry
    }

    /// Apply `command` on behalf of `ctx`.
    ///
    /// Returns `applied`, `conflict` or `rejected`; only failures that leave
    /// the canvas untouched (or `TimelineAfterCommit`) are errors.
    pub async fn apply(
        &self,
        ctx: &RequestContext,
        command: CommandEnvelope,
    ) -> Result<RevisionResult, ApplyError> {
        command.validate()?;
        self.registry.validate_routing(ctx, &command.routing)?;
        self.authorize_canvas(ctx, &command.canvas_id).await?;
        self.gate.run(
            ctx,
            &GateRequest {
                action: APPLY_ACTION,
                surface: ctx.surface_id.as_deref(),
                subject_type: ResourceKind::Canvas.as_str(),
                subject_id: command.canvas_id.as_str(),
            },
        )?;

        let ops = match &command.payload {
            CommandPayload::ApplyOps { ops } if !ops.is_empty() => ops.clone(),
            CommandPayload::ApplyOps { .. } => {
                return self.reject(&command, "op batch is empty").await;
            }
            CommandPayload::Opaque { kind, .. } => {
                let reason = format!("unsupported command type '{kind}'");
                return self.reject(&command, &reason).await;
            }
        };

        let _guard = self.locks.acquire(&command.canvas_id).await?;

        let head = self.revisions.head(&command.canvas_id).await?;
        self.republish_missing(ctx, &command, &head).await?;

        if let Some(key) = &command.idempotency_key {
            if let Some(prior) = self.revisions.idempotent_result(&command.canvas_id, key).await? {
                tracing::debug!(
                    canvas_id = %command.canvas_id,
                    current_rev = prior.current_rev,
                    "idempotent replay"
                );
                return Ok(prior.as_idempotent_replay());
            }
        }

        if head.head_rev != command.base_rev {
            return self.conflict(&command, &head).await;
        }

        let revision = head.head_rev + 1;
        let event = self.committed_event(
            ctx,
            command.routing.clone(),
            &command.canvas_id,
            &command.command_id,
            revision,
            ops.clone(),
            EventId::generate(),
        )?;
        check_scope(&event, ctx).map_err(RealtimeError::from)?;

        let outcome = self
            .revisions
            .commit(Commit {
                canvas_id: command.canvas_id.clone(),
                base_rev: command.base_rev,
                ops,
                command_id: command.command_id.clone(),
                idempotency_key: command.idempotency_key.clone(),
                event_id: event.event_id().clone(),
            })
            .await?;

        match outcome {
            CommitOutcome::Committed(head) => {
                let stream_id = StreamId::for_resource(ResourceKind::Canvas, &command.canvas_id);
                if let Err(source) = self.timeline.append(&stream_id, &event, ctx).await {
                    tracing::error!(
                        canvas_id = %command.canvas_id,
                        revision = head.head_rev,
                        event_id = %event.event_id(),
                        error = %source,
                        "revision committed but timeline append failed"
                    );
                    return Err(ApplyError::TimelineAfterCommit {
                        revision: head.head_rev,
                        source,
                    });
                }
                tracing::debug!(
                    canvas_id = %command.canvas_id,
                    revision = head.head_rev,
                    event_id = %event.event_id(),
                    "command applied"
                );
                Ok(RevisionResult::applied(
                    head.head_rev,
                    command.base_rev,
                    event.event_id().clone(),
                ))
            }
            // Both are settled under the lock above; a store that still
            // reports them had a concurrent writer outside this engine.
            CommitOutcome::Stale(head) => self.conflict(&command, &head).await,
            CommitOutcome::Duplicate(prior) => Ok(prior.as_idempotent_replay()),
        }
    }

    /// Current head of a canvas the caller owns.
    pub async fn head(
        &self,
        ctx: &RequestContext,
        canvas_id: &ResourceId,
    ) -> Result<CanvasRevision, ApplyError> {
        self.registry
            .verify_access(&ctx.tenant_id, canvas_id, ResourceKind::Canvas)
            .await?;
        Ok(self.revisions.head(canvas_id).await?)
    }

    async fn authorize_canvas(
        &self,
        ctx: &RequestContext,
        canvas_id: &ResourceId,
    ) -> Result<(), RealtimeError> {
        match self.options.unknown_resources {
            UnknownResourcePolicy::Deny => {
                self.registry
                    .verify_access(&ctx.tenant_id, canvas_id, ResourceKind::Canvas)
                    .await
            }
            // `register` is a no-op for the owner and NotFound for anyone else.
            UnknownResourcePolicy::RegisterOnFirstWrite => {
                self.registry
                    .register(&ctx.tenant_id, canvas_id, ResourceKind::Canvas)
                    .await
            }
        }
    }

    /// Append the events of committed revisions that never reached the
    /// canvas stream, oldest first.
    ///
    /// Events are appended in revision order under the canvas lock, so the
    /// stream always holds a prefix of the op log and the missing events are
    /// a suffix of it.
    async fn republish_missing(
        &self,
        ctx: &RequestContext,
        command: &CommandEnvelope,
        head: &CanvasRevision,
    ) -> Result<(), ApplyError> {
        if head.head_rev == 0 {
            return Ok(());
        }
        let stream_id = StreamId::for_resource(ResourceKind::Canvas, &command.canvas_id);

        let latest = self
            .revisions
            .ops_after(&command.canvas_id, head.head_rev - 1)
            .await?;
        match latest.first() {
            Some(entry) if !self.on_timeline(&stream_id, &entry.event_id).await? => {}
            _ => return Ok(()),
        }

        let mut missing = self.revisions.ops_after(&command.canvas_id, 0).await?;
        let mut first_missing = missing.len();
        while first_missing > 0
            && !self
                .on_timeline(&stream_id, &missing[first_missing - 1].event_id)
                .await?
        {
            first_missing -= 1;
        }
        let missing = missing.split_off(first_missing);

        for entry in missing {
            // The retried command carries the original routing; anything
            // else is rebuilt from the caller's scope.
            let routing = if entry.command_id == command.command_id {
                command.routing.clone()
            } else {
                ctx.routing_keys()
            };
            let event = self.committed_event(
                ctx,
                routing,
                &command.canvas_id,
                &entry.command_id,
                entry.revision,
                entry.ops,
                entry.event_id,
            )?;
            match self.timeline.append(&stream_id, &event, ctx).await {
                Ok(()) | Err(StoreError::DuplicateEvent(_)) => {
                    tracing::info!(
                        canvas_id = %command.canvas_id,
                        revision = entry.revision,
                        event_id = %event.event_id(),
                        "republished missing revision event"
                    );
                }
                Err(source) => {
                    tracing::error!(
                        canvas_id = %command.canvas_id,
                        revision = entry.revision,
                        error = %source,
                        "revision event still missing from timeline"
                    );
                    return Err(ApplyError::TimelineAfterCommit {
                        revision: entry.revision,
                        source,
                    });
                }
            }
        }
        Ok(())
    }

    async fn on_timeline(&self, stream_id: &StreamId, event_id: &EventId) -> Result<bool, StoreError> {
        match self.timeline.list_after(stream_id, Some(event_id)).await {
            Ok(_) => Ok(true),
            Err(StoreError::CursorInvalid { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn conflict(
        &self,
        command: &CommandEnvelope,
        head: &CanvasRevision,
    ) -> Result<RevisionResult, ApplyError> {
        let recovery = self
            .revisions
            .ops_after(&command.canvas_id, command.base_rev)
            .await?;
        tracing::debug!(
            canvas_id = %command.canvas_id,
            base_rev = command.base_rev,
            head_rev = head.head_rev,
            recovery_ops = recovery.len(),
            "revision conflict"
        );
        Ok(RevisionResult::conflict(head.head_rev, command.base_rev, recovery))
    }

    async fn reject(
        &self,
        command: &CommandEnvelope,
        reason: &str,
    ) -> Result<RevisionResult, ApplyError> {
        let head = self.revisions.head(&command.canvas_id).await?;
        tracing::warn!(
            canvas_id = %command.canvas_id,
            command_id = %command.command_id,
            kind = command.kind(),
            reason,
            "command rejected"
        );
        Ok(RevisionResult::rejected(head.head_rev, command.base_rev, reason))
    }

    #[allow(clippy::too_many_arguments)]
    fn committed_event(
        &self,
        ctx: &RequestContext,
        mut routing: RoutingKeys,
        canvas_id: &ResourceId,
        command_id: &str,
        revision: u64,
        ops: Vec<CanvasOp>,
        event_id: EventId,
    ) -> Result<StreamEvent, RealtimeError> {
        routing.canvas_id = Some(canvas_id.clone());
        if routing.actor_id.is_none() {
            routing.actor_id = Some(ctx.user_id.to_string());
        }

        let body = EventBody::CanvasOpsApplied(CanvasOpsApplied {
            canvas_id: canvas_id.clone(),
            revision,
            command_id: command_id.to_string(),
            ops,
        });
        let ids = EventIds {
            run_id: Some(command_id.to_string()),
            step_id: Some(format!("rev-{revision}")),
            ..ctx.event_ids()
        };
        let meta = EventMeta {
            schema_version: Some(SCHEMA_VERSION.to_string()),
            severity: Some(Severity::Info),
            storage_class: Some(StorageClass::Hot),
            ..EventMeta::default()
        };

        let mut builder = StreamEvent::builder(routing, body)
            .event_id(event_id)
            .sequence(revision)
            .ids(ids)
            .meta(meta);
        if let Some(trace_id) = &ctx.trace_id {
            builder = builder.trace(trace_id.clone(), None);
        }
        let strictness = if self.options.strict_events {
            Strictness::Strict
        } else {
            Strictness::Lenient
        };
        builder.build(strictness)
    }
}

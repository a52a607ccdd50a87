//! Integration tests for the realtime pipeline on durable backends.
//!
//! Command → Isolation → RevisionStore → Timeline → Bus → ResumeFeed
//!
//! Verifies:
//! - applied commands reach live subscribers and survive a restart
//! - a reconnecting client receives exactly what it missed
//! - tenants never see each other's canvases or events

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use atrium_auth::{AllowAllGate, RequestContext};
    use atrium_core::{RealtimeError, ResourceId, ResourceKind, StreamId, TenantId, UserId};
    use atrium_events::{
        CanvasOp, CommandEnvelope, CommandPayload, Env, EventBody, EventBus, InMemoryEventBus,
        LiveEvent, RevisionStatus, RoutingKeys,
    };
    use serde_json::json;

    use crate::apply::CommandApplyEngine;
    use crate::backends::{StateStores, build_state, build_timeline};
    use crate::config::{StateBackend, TimelineBackend};
    use crate::error::{ApplyError, StoreError};
    use crate::timeline::{PublishingTimeline, ResumeFeed, TimelineStore};

    type Bus = Arc<InMemoryEventBus<LiveEvent>>;

    struct Node {
        engine: CommandApplyEngine,
        timeline: Arc<PublishingTimeline<Bus>>,
        bus: Bus,
        state: StateStores,
    }

    async fn boot(dir: &std::path::Path) -> Node {
        let store = build_timeline(&TimelineBackend::Fs {
            dir: dir.to_path_buf(),
        })
        .await
        .unwrap();
        let state = build_state(&StateBackend::Fs {
            dir: dir.to_path_buf(),
        })
        .await
        .unwrap();
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let timeline = Arc::new(PublishingTimeline::new(store, Arc::clone(&bus)));
        let engine = CommandApplyEngine::new(
            state.registry.clone(),
            Arc::new(AllowAllGate),
            state.revisions.clone(),
            timeline.clone(),
        );
        Node {
            engine,
            timeline,
            bus,
            state,
        }
    }

    fn ctx(tenant: &str) -> RequestContext {
        RequestContext::new(TenantId::new(tenant).unwrap(), UserId::new("u1").unwrap())
    }

    fn canvas() -> ResourceId {
        ResourceId::new("c1").unwrap()
    }

    fn stream() -> StreamId {
        StreamId::for_resource(ResourceKind::Canvas, &canvas())
    }

    fn add_node(tenant: &str, base_rev: u64, node: &str) -> CommandEnvelope {
        CommandEnvelope {
            command_id: format!("cmd-{node}"),
            canvas_id: canvas(),
            base_rev,
            idempotency_key: Some(format!("key-{node}")),
            payload: CommandPayload::ApplyOps {
                ops: vec![CanvasOp::AddNode {
                    node_id: node.to_string(),
                    props: json!({"label": node}),
                }],
            },
            routing: RoutingKeys::new(TenantId::new(tenant).unwrap(), Env::Dev),
        }
    }

    #[tokio::test]
    async fn applied_commands_are_broadcast_and_replayable() {
        let dir = tempfile::tempdir().unwrap();
        let node = boot(dir.path()).await;
        let t_a = ctx("t_A");
        node.state
            .registry
            .register(&t_a.tenant_id, &canvas(), ResourceKind::Canvas)
            .await
            .unwrap();
        let sub = node.bus.subscribe();

        let r = node.engine.apply(&t_a, add_node("t_A", 0, "a")).await.unwrap();
        assert_eq!(r.status, RevisionStatus::Applied);

        let live = sub.try_recv().unwrap();
        assert_eq!(live.stream_id, stream());
        assert_eq!(Some(live.event.event_id()), r.event_id.as_ref());
        match live.event.body() {
            EventBody::CanvasOpsApplied(body) => assert_eq!(body.revision, 1),
            other => panic!("unexpected body {other:?}"),
        }
        assert_eq!(node.timeline.list_after(&stream(), None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reconnect_after_restart_sees_only_missed_events() {
        let dir = tempfile::tempdir().unwrap();
        let t_a = ctx("t_A");

        let (cursor, missed) = {
            let node = boot(dir.path()).await;
            node.state
                .registry
                .register(&t_a.tenant_id, &canvas(), ResourceKind::Canvas)
                .await
                .unwrap();
            let first = node.engine.apply(&t_a, add_node("t_A", 0, "a")).await.unwrap();
            let second = node.engine.apply(&t_a, add_node("t_A", 1, "b")).await.unwrap();
            (first.event_id.unwrap(), second.event_id.unwrap())
        };

        let node = boot(dir.path()).await;

        // Revision state and idempotency survived the restart.
        let retry = node.engine.apply(&t_a, add_node("t_A", 1, "b")).await.unwrap();
        assert_eq!(retry.current_rev, 2);
        assert_eq!(retry.event_id.as_ref(), Some(&missed));
        let stale = node.engine.apply(&t_a, add_node("t_A", 1, "c")).await.unwrap();
        assert_eq!(stale.status, RevisionStatus::Conflict);
        assert_eq!(stale.recovery_ops.len(), 1);

        let mut feed = ResumeFeed::open(
            node.timeline.as_ref(),
            &*node.bus,
            t_a.tenant_id.clone(),
            stream(),
            Some(&cursor),
        )
        .await
        .unwrap();
        let backlog = feed.take_backlog();
        assert_eq!(backlog.len(), 1);
        assert_eq!(backlog[0].event_id(), &missed);

        let live = node.engine.apply(&t_a, add_node("t_A", 2, "c")).await.unwrap();
        let next = feed.next_live(Duration::from_millis(200)).unwrap().unwrap();
        assert_eq!(Some(next.event_id()), live.event_id.as_ref());
        assert_eq!(feed.next_live(Duration::from_millis(20)).unwrap(), None);
    }

    #[tokio::test]
    async fn tenants_are_isolated_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let node = boot(dir.path()).await;
        let (t_a, t_b) = (ctx("t_A"), ctx("t_B"));
        let thread = ResourceId::new("th-1").unwrap();

        node.state
            .registry
            .register(&t_a.tenant_id, &thread, ResourceKind::Thread)
            .await
            .unwrap();
        assert_eq!(
            node.state
                .registry
                .verify_access(&t_b.tenant_id, &thread, ResourceKind::Thread)
                .await,
            Err(RealtimeError::NotFound)
        );
        assert_eq!(
            node.state
                .registry
                .register(&t_b.tenant_id, &thread, ResourceKind::Thread)
                .await,
            Err(RealtimeError::NotFound)
        );

        node.state
            .registry
            .register(&t_a.tenant_id, &canvas(), ResourceKind::Canvas)
            .await
            .unwrap();
        let err = node.engine.apply(&t_b, add_node("t_B", 0, "x")).await.unwrap_err();
        assert!(matches!(err, ApplyError::Realtime(RealtimeError::NotFound)));

        let err = node
            .timeline
            .list_after(&stream(), Some(&atrium_core::EventId::new("bogus").unwrap()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::CursorInvalid { .. }));
    }
}

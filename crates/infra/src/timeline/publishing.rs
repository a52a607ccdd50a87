use std::sync::Arc;

use async_trait::async_trait;

use atrium_auth::RequestContext;
use atrium_core::{EventId, StreamId};
use atrium_events::{EventBus, LiveEvent, StreamEvent};

use super::{TimelineStore, check_scope};
use crate::error::StoreError;

/// Timeline that broadcasts what it stores.
///
/// Durable events are published only after the append succeeded, so a live
/// subscriber never sees an event that replay could not return. Once stored,
/// a failed broadcast is logged and the append still succeeds. Ephemeral
/// events skip the store and are only broadcast.
pub struct PublishingTimeline<B> {
    store: Arc<dyn TimelineStore>,
    bus: B,
}

impl<B> PublishingTimeline<B> {
    pub fn new(store: Arc<dyn TimelineStore>, bus: B) -> Self {
        Self { store, bus }
    }
}

impl<B> PublishingTimeline<B>
where
    B: EventBus<LiveEvent>,
{
    fn publish(&self, stream_id: &StreamId, event: &StreamEvent) -> Result<(), StoreError> {
        self.bus
            .publish(LiveEvent::new(stream_id.clone(), event.clone()))
            .map_err(|e| StoreError::Publish(e.to_string()))
    }
}

#[async_trait]
impl<B> TimelineStore for PublishingTimeline<B>
where
    B: EventBus<LiveEvent> + 'static,
{
    async fn append(
        &self,
        stream_id: &StreamId,
        event: &StreamEvent,
        ctx: &RequestContext,
    ) -> Result<(), StoreError> {
        if !event.is_durable() {
            check_scope(event, ctx)?;
            return self.publish(stream_id, event);
        }

        self.store.append(stream_id, event, ctx).await?;
        // Stored: a subscriber that misses the broadcast recovers it by replay.
        if let Err(e) = self.publish(stream_id, event) {
            tracing::warn!(
                %stream_id,
                event_id = %event.event_id(),
                error = %e,
                "event stored but not broadcast"
            );
        }
        Ok(())
    }

    async fn list_after(
        &self,
        stream_id: &StreamId,
        after: Option<&EventId>,
    ) -> Result<Vec<StreamEvent>, StoreError> {
        self.store.list_after(stream_id, after).await
    }
}

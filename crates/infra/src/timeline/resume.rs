//! Reconnect-safe delivery: backlog from the timeline, then live events.
//!
//! The bus subscription is taken *before* the backlog is read. Anything
//! appended in between shows up in both; those duplicates are dropped by id,
//! so the client sees every event after its cursor exactly once.

use std::collections::HashSet;
use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;

use thiserror::Error;

use atrium_core::{EventId, StreamId, TenantId};
use atrium_events::{EventBus, LiveEvent, StreamEvent, Subscription, TenantScoped};

use super::TimelineStore;
use crate::error::StoreError;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("live feed closed")]
pub struct FeedClosed;

#[derive(Debug)]
pub struct ResumeFeed {
    stream_id: StreamId,
    tenant_id: TenantId,
    backlog: Vec<StreamEvent>,
    delivered: HashSet<EventId>,
    subscription: Subscription<LiveEvent>,
}

impl ResumeFeed {
    pub async fn open<B>(
        timeline: &dyn TimelineStore,
        bus: &B,
        tenant_id: TenantId,
        stream_id: StreamId,
        after: Option<&EventId>,
    ) -> Result<Self, StoreError>
    where
        B: EventBus<LiveEvent> + ?Sized,
    {
        let subscription = bus.subscribe();
        let backlog = timeline.list_after(&stream_id, after).await?;
        let delivered = backlog.iter().map(|e| e.event_id().clone()).collect();
        tracing::debug!(%stream_id, backlog = backlog.len(), "resume feed opened");
        Ok(Self {
            stream_id,
            tenant_id,
            backlog,
            delivered,
            subscription,
        })
    }

    /// Events missed since the cursor, in append order. Empty after the
    /// first call.
    pub fn take_backlog(&mut self) -> Vec<StreamEvent> {
        std::mem::take(&mut self.backlog)
    }

    /// Block up to `timeout` for the next live event of this stream.
    ///
    /// `Ok(None)` means the timeout elapsed.
    pub fn next_live(&mut self, timeout: Duration) -> Result<Option<StreamEvent>, FeedClosed> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            let live = match self.subscription.recv_timeout(remaining) {
                Ok(live) => live,
                Err(RecvTimeoutError::Timeout) => return Ok(None),
                Err(RecvTimeoutError::Disconnected) => return Err(FeedClosed),
            };
            if live.stream_id != self.stream_id || !live.belongs_to(&self.tenant_id) {
                continue;
            }
            if self.delivered.remove(live.event.event_id()) {
                continue;
            }
            return Ok(Some(live.event));
        }
    }

    pub fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }
}

//! Durable, append-only event timelines with cursor replay.
//!
//! Every backend keeps the same contract:
//!
//! - `append` defines a total order per stream;
//! - `list_after(stream, None)` returns the whole stream in that order;
//! - `list_after(stream, Some(cursor))` returns everything strictly after the
//!   cursor, or `CursorInvalid` when the cursor is not in the stream;
//! - repeated reads of an unchanged stream serialize identically.

pub mod file;
pub mod memory;
pub mod postgres;
pub mod publishing;
#[cfg(feature = "redis")]
pub mod redis_list;
pub mod resume;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use atrium_auth::RequestContext;
use atrium_core::{EventId, StreamId};
use atrium_events::StreamEvent;

use crate::error::StoreError;

pub use file::FileTimelineStore;
pub use memory::InMemoryTimelineStore;
pub use postgres::PostgresTimelineStore;
pub use publishing::PublishingTimeline;
#[cfg(feature = "redis")]
pub use redis_list::RedisTimelineStore;
pub use resume::{FeedClosed, ResumeFeed};

#[async_trait]
pub trait TimelineStore: Send + Sync {
    /// Persist `event` as the next entry of `stream_id`.
    ///
    /// Fails with `ScopeMismatch` when the event is addressed outside the
    /// caller's scope, and `DuplicateEvent` when its id is already stored.
    async fn append(
        &self,
        stream_id: &StreamId,
        event: &StreamEvent,
        ctx: &RequestContext,
    ) -> Result<(), StoreError>;

    async fn list_after(
        &self,
        stream_id: &StreamId,
        after: Option<&EventId>,
    ) -> Result<Vec<StreamEvent>, StoreError>;
}

#[async_trait]
impl<S> TimelineStore for Arc<S>
where
    S: TimelineStore + ?Sized,
{
    async fn append(
        &self,
        stream_id: &StreamId,
        event: &StreamEvent,
        ctx: &RequestContext,
    ) -> Result<(), StoreError> {
        (**self).append(stream_id, event, ctx).await
    }

    async fn list_after(
        &self,
        stream_id: &StreamId,
        after: Option<&EventId>,
    ) -> Result<Vec<StreamEvent>, StoreError> {
        (**self).list_after(stream_id, after).await
    }
}

/// Reject events whose routing scope differs from the caller's.
///
/// The tenant must always match; project and mode only when the caller
/// names one.
pub fn check_scope(event: &StreamEvent, ctx: &RequestContext) -> Result<(), StoreError> {
    let routing = event.routing();
    if routing.tenant_id != ctx.tenant_id {
        return Err(StoreError::ScopeMismatch(format!(
            "event tenant '{}' is not the caller's",
            routing.tenant_id
        )));
    }
    if ctx.project_id.is_some() && routing.project_id != ctx.project_id {
        return Err(StoreError::ScopeMismatch(format!(
            "event project {:?} is not the caller's",
            routing.project_id
        )));
    }
    if ctx.mode.is_some() && routing.mode != ctx.mode {
        return Err(StoreError::ScopeMismatch(format!(
            "event mode {:?} is not the caller's",
            routing.mode
        )));
    }
    Ok(())
}

/// One stream held in memory: events in append order plus an id index.
#[derive(Debug, Default, Clone)]
pub(crate) struct StreamLog {
    events: Vec<StreamEvent>,
    positions: HashMap<EventId, usize>,
}

impl StreamLog {
    pub(crate) fn from_events(events: Vec<StreamEvent>) -> Result<Self, StoreError> {
        let mut log = Self::default();
        for event in events {
            log.check_new(&event)?;
            log.push(event);
        }
        Ok(log)
    }

    pub(crate) fn check_new(&self, event: &StreamEvent) -> Result<(), StoreError> {
        if self.positions.contains_key(event.event_id()) {
            return Err(StoreError::DuplicateEvent(event.event_id().clone()));
        }
        Ok(())
    }

    pub(crate) fn push(&mut self, event: StreamEvent) {
        self.positions.insert(event.event_id().clone(), self.events.len());
        self.events.push(event);
    }

    pub(crate) fn after(
        &self,
        stream_id: &StreamId,
        after: Option<&EventId>,
    ) -> Result<Vec<StreamEvent>, StoreError> {
        let start = match after {
            None => 0,
            Some(cursor) => match self.positions.get(cursor) {
                Some(pos) => pos + 1,
                None => {
                    return Err(StoreError::CursorInvalid {
                        stream_id: stream_id.clone(),
                        cursor: cursor.clone(),
                    });
                }
            },
        };
        Ok(self.events[start..].to_vec())
    }

    pub(crate) fn len(&self) -> usize {
        self.events.len()
    }
}

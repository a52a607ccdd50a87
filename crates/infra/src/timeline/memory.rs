use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use atrium_auth::RequestContext;
use atrium_core::{EventId, StreamId};
use atrium_events::StreamEvent;

use super::{StreamLog, TimelineStore, check_scope};
use crate::error::StoreError;

/// Timeline kept in process memory. Lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryTimelineStore {
    streams: RwLock<HashMap<StreamId, StreamLog>>,
}

impl InMemoryTimelineStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stream_len(&self, stream_id: &StreamId) -> usize {
        self.streams
            .read()
            .map(|s| s.get(stream_id).map_or(0, StreamLog::len))
            .unwrap_or(0)
    }
}

#[async_trait]
impl TimelineStore for InMemoryTimelineStore {
    async fn append(
        &self,
        stream_id: &StreamId,
        event: &StreamEvent,
        ctx: &RequestContext,
    ) -> Result<(), StoreError> {
        check_scope(event, ctx)?;
        let mut streams = self.streams.write().map_err(|_| StoreError::poisoned("timeline"))?;
        let log = streams.entry(stream_id.clone()).or_default();
        log.check_new(event)?;
        log.push(event.clone());
        Ok(())
    }

    async fn list_after(
        &self,
        stream_id: &StreamId,
        after: Option<&EventId>,
    ) -> Result<Vec<StreamEvent>, StoreError> {
        let streams = self.streams.read().map_err(|_| StoreError::poisoned("timeline"))?;
        match streams.get(stream_id) {
            Some(log) => log.after(stream_id, after),
            None => StreamLog::default().after(stream_id, after),
        }
    }
}

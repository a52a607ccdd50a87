//! Filesystem timeline: one JSON-lines file per stream under
//! `<root>/streams/`, synced on every append.
//!
//! Recently used streams are served from memory, at most `cache_capacity` of
//! them; an evicted stream is reloaded from its file. Appends go to disk
//! first. Only one process may own a root directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::instrument;

use atrium_auth::RequestContext;
use atrium_core::{EventId, StreamId};
use atrium_events::StreamEvent;

use super::{StreamLog, TimelineStore, check_scope};
use crate::error::StoreError;
use crate::jsonl;
use crate::slots::{DEFAULT_CAPACITY, SlotCache};

#[derive(Debug)]
pub struct FileTimelineStore {
    dir: PathBuf,
    slots: SlotCache<StreamId, StreamLog>,
}

impl FileTimelineStore {
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = root.as_ref().join("streams");
        jsonl::ensure_dir(&dir).await?;
        Ok(Self {
            dir,
            slots: SlotCache::new(DEFAULT_CAPACITY),
        })
    }

    /// Keep at most `capacity` streams in memory.
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.slots = SlotCache::new(capacity);
        self
    }

    fn path(&self, stream_id: &StreamId) -> PathBuf {
        jsonl::jsonl_path(&self.dir, stream_id.as_str())
    }

    async fn loaded<'a>(
        &self,
        stream_id: &StreamId,
        slot: &'a mut Option<StreamLog>,
    ) -> Result<&'a mut StreamLog, StoreError> {
        if slot.is_none() {
            let events = jsonl::load(&self.path(stream_id)).await?;
            *slot = Some(StreamLog::from_events(events)?);
        }
        slot.as_mut()
            .ok_or_else(|| StoreError::Backend(format!("stream '{stream_id}' failed to load")))
    }
}

#[async_trait]
impl TimelineStore for FileTimelineStore {
    #[instrument(
        skip(self, event, ctx),
        fields(stream_id = %stream_id, event_id = %event.event_id()),
        err
    )]
    async fn append(
        &self,
        stream_id: &StreamId,
        event: &StreamEvent,
        ctx: &RequestContext,
    ) -> Result<(), StoreError> {
        check_scope(event, ctx)?;
        let slot = self.slots.slot(stream_id)?;
        let mut guard = slot.lock().await;
        let log = self.loaded(stream_id, &mut guard).await?;
        log.check_new(event)?;

        jsonl::append(&self.path(stream_id), event).await?;
        log.push(event.clone());
        Ok(())
    }

    async fn list_after(
        &self,
        stream_id: &StreamId,
        after: Option<&EventId>,
    ) -> Result<Vec<StreamEvent>, StoreError> {
        let slot = self.slots.slot(stream_id)?;
        let mut guard = slot.lock().await;
        let log = self.loaded(stream_id, &mut guard).await?;
        log.after(stream_id, after)
    }
}

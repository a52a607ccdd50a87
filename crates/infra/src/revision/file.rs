//! Revision store journaled to one JSON-lines file per canvas.
//!
//! The journal is the source of truth: a canvas is rebuilt from it on first
//! access, and a commit only becomes visible after its line is synced. At most
//! `cache_capacity` canvases stay loaded; the cache assumes this process is
//! the only writer of `dir`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use atrium_core::ResourceId;
use atrium_events::{CanvasRevision, OpLogEntry, RevisionResult};

use super::{CanvasLog, Commit, CommitOutcome, RevisionStore};
use crate::error::StoreError;
use crate::jsonl;
use crate::slots::{DEFAULT_CAPACITY, SlotCache};

#[derive(Debug, Serialize, Deserialize)]
struct JournalRecord {
    entry: OpLogEntry,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    idempotency_key: Option<String>,
}

#[derive(Debug)]
pub struct FileRevisionStore {
    dir: PathBuf,
    slots: SlotCache<ResourceId, CanvasLog>,
}

impl FileRevisionStore {
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        jsonl::ensure_dir(&dir).await?;
        Ok(Self {
            dir,
            slots: SlotCache::new(DEFAULT_CAPACITY),
        })
    }

    /// Keep at most `capacity` canvases in memory.
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.slots = SlotCache::new(capacity);
        self
    }

    fn journal_path(&self, canvas_id: &ResourceId) -> PathBuf {
        jsonl::jsonl_path(&self.dir, canvas_id.as_str())
    }

    /// Run `f` on the canvas with its slot locked, loading it if needed.
    async fn with_log<T>(
        &self,
        canvas_id: &ResourceId,
        f: impl FnOnce(&CanvasLog) -> T,
    ) -> Result<T, StoreError> {
        let slot = self.slots.slot(canvas_id)?;
        let mut guard = slot.lock().await;
        let log = self.loaded(canvas_id, &mut guard).await?;
        Ok(f(log))
    }

    async fn loaded<'a>(
        &self,
        canvas_id: &ResourceId,
        slot: &'a mut Option<CanvasLog>,
    ) -> Result<&'a mut CanvasLog, StoreError> {
        if slot.is_none() {
            let records: Vec<JournalRecord> = jsonl::load(&self.journal_path(canvas_id)).await?;
            let log = CanvasLog::replay(
                canvas_id.clone(),
                records.into_iter().map(|r| (r.entry, r.idempotency_key)),
            )?;
            tracing::debug!(%canvas_id, head_rev = log.head().head_rev, "canvas journal loaded");
            *slot = Some(log);
        }
        slot.as_mut()
            .ok_or_else(|| StoreError::Backend(format!("canvas '{canvas_id}' failed to load")))
    }
}

#[async_trait]
impl RevisionStore for FileRevisionStore {
    async fn head(&self, canvas_id: &ResourceId) -> Result<CanvasRevision, StoreError> {
        self.with_log(canvas_id, |log| log.head().clone()).await
    }

    async fn idempotent_result(
        &self,
        canvas_id: &ResourceId,
        idempotency_key: &str,
    ) -> Result<Option<RevisionResult>, StoreError> {
        self.with_log(canvas_id, |log| log.idempotent_result(idempotency_key)).await
    }

    async fn ops_after(
        &self,
        canvas_id: &ResourceId,
        base_rev: u64,
    ) -> Result<Vec<OpLogEntry>, StoreError> {
        self.with_log(canvas_id, |log| log.ops_after(base_rev)).await
    }

    #[instrument(
        skip(self, commit),
        fields(canvas_id = %commit.canvas_id, base_rev = commit.base_rev),
        err
    )]
    async fn commit(&self, commit: Commit) -> Result<CommitOutcome, StoreError> {
        let canvas_id = commit.canvas_id.clone();
        let slot = self.slots.slot(&canvas_id)?;
        let mut guard = slot.lock().await;
        let log = self.loaded(&canvas_id, &mut guard).await?;

        let idempotency_key = commit.idempotency_key.clone();
        let entry = match log.prepare(commit) {
            Ok(entry) => entry,
            Err(outcome) => return Ok(outcome),
        };

        let record = JournalRecord {
            entry,
            idempotency_key,
        };
        jsonl::append(&self.journal_path(&canvas_id), &record).await?;
        log.push(record.entry, record.idempotency_key);
        Ok(CommitOutcome::Committed(log.head().clone()))
    }
}

//! Per-canvas head revision, op log and idempotency map.
//!
//! `commit` is the only mutation and is a single compare-and-increment per
//! canvas: a stale `base_rev` or a recorded idempotency key leaves the canvas
//! untouched.

pub mod file;
pub mod memory;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use atrium_core::{EventId, ResourceId};
use atrium_events::{CanvasOp, CanvasRevision, OpLogEntry, RevisionResult};

use crate::error::StoreError;

pub use file::FileRevisionStore;
pub use memory::InMemoryRevisionStore;

/// A batch to commit on top of `base_rev`.
#[derive(Debug, Clone, PartialEq)]
pub struct Commit {
    pub canvas_id: ResourceId,
    pub base_rev: u64,
    pub ops: Vec<CanvasOp>,
    pub command_id: String,
    pub idempotency_key: Option<String>,
    pub event_id: EventId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    /// Head advanced by one; carries the new head.
    Committed(CanvasRevision),
    /// `base_rev` was not the head; carries the unchanged head.
    Stale(CanvasRevision),
    /// The idempotency key was already recorded; carries the stored result.
    Duplicate(RevisionResult),
}

#[async_trait]
pub trait RevisionStore: Send + Sync {
    /// Current head, creating it at revision 0 when the canvas is new.
    async fn head(&self, canvas_id: &ResourceId) -> Result<CanvasRevision, StoreError>;

    async fn idempotent_result(
        &self,
        canvas_id: &ResourceId,
        idempotency_key: &str,
    ) -> Result<Option<RevisionResult>, StoreError>;

    /// Entries with `revision > base_rev`, ascending.
    async fn ops_after(
        &self,
        canvas_id: &ResourceId,
        base_rev: u64,
    ) -> Result<Vec<OpLogEntry>, StoreError>;

    async fn commit(&self, commit: Commit) -> Result<CommitOutcome, StoreError>;
}

#[async_trait]
impl<S> RevisionStore for Arc<S>
where
    S: RevisionStore + ?Sized,
{
    async fn head(&self, canvas_id: &ResourceId) -> Result<CanvasRevision, StoreError> {
        (**self).head(canvas_id).await
    }

    async fn idempotent_result(
        &self,
        canvas_id: &ResourceId,
        idempotency_key: &str,
    ) -> Result<Option<RevisionResult>, StoreError> {
        (**self).idempotent_result(canvas_id, idempotency_key).await
    }

    async fn ops_after(
        &self,
        canvas_id: &ResourceId,
        base_rev: u64,
    ) -> Result<Vec<OpLogEntry>, StoreError> {
        (**self).ops_after(canvas_id, base_rev).await
    }

    async fn commit(&self, commit: Commit) -> Result<CommitOutcome, StoreError> {
        (**self).commit(commit).await
    }
}

/// In-memory state of one canvas, shared by the backends.
#[derive(Debug, Clone)]
pub(crate) struct CanvasLog {
    head: CanvasRevision,
    entries: Vec<OpLogEntry>,
    idempotency: HashMap<String, RevisionResult>,
}

impl CanvasLog {
    pub(crate) fn new(canvas_id: ResourceId) -> Self {
        Self {
            head: CanvasRevision::initial(canvas_id),
            entries: Vec::new(),
            idempotency: HashMap::new(),
        }
    }

    /// Rebuild from journal records in commit order.
    pub(crate) fn replay(
        canvas_id: ResourceId,
        records: impl IntoIterator<Item = (OpLogEntry, Option<String>)>,
    ) -> Result<Self, StoreError> {
        let mut log = Self::new(canvas_id);
        for (entry, key) in records {
            if entry.revision != log.head.head_rev + 1 {
                return Err(StoreError::Backend(format!(
                    "journal for canvas '{}' jumps from revision {} to {}",
                    log.head.canvas_id, log.head.head_rev, entry.revision
                )));
            }
            log.push(entry, key);
        }
        Ok(log)
    }

    pub(crate) fn head(&self) -> &CanvasRevision {
        &self.head
    }

    pub(crate) fn idempotent_result(&self, key: &str) -> Option<RevisionResult> {
        self.idempotency.get(key).cloned()
    }

    pub(crate) fn ops_after(&self, base_rev: u64) -> Vec<OpLogEntry> {
        // Revisions start at 1 and are dense, so entry `i` is revision `i + 1`.
        let start = usize::try_from(base_rev).unwrap_or(usize::MAX).min(self.entries.len());
        self.entries[start..].to_vec()
    }

    /// Decide a commit without applying it. `Ok(entry)` means the commit
    /// should be written as `entry`.
    pub(crate) fn prepare(&self, commit: Commit) -> Result<OpLogEntry, CommitOutcome> {
        if let Some(key) = &commit.idempotency_key {
            if let Some(prior) = self.idempotency.get(key) {
                return Err(CommitOutcome::Duplicate(prior.clone()));
            }
        }
        if commit.base_rev != self.head.head_rev {
            return Err(CommitOutcome::Stale(self.head.clone()));
        }
        Ok(OpLogEntry {
            revision: self.head.head_rev + 1,
            ops: commit.ops,
            command_id: commit.command_id,
            event_id: commit.event_id,
            committed_at: Utc::now(),
        })
    }

    /// Apply an entry produced by `prepare`.
    pub(crate) fn push(&mut self, entry: OpLogEntry, idempotency_key: Option<String>) {
        let base_rev = self.head.head_rev;
        self.head.head_rev = entry.revision;
        self.head.updated_at = entry.committed_at;
        if let Some(key) = idempotency_key {
            self.idempotency.insert(
                key,
                RevisionResult::applied(entry.revision, base_rev, entry.event_id.clone()),
            );
        }
        self.entries.push(entry);
    }
}

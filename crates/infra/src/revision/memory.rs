use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use atrium_core::ResourceId;
use atrium_events::{CanvasRevision, OpLogEntry, RevisionResult};

use super::{CanvasLog, Commit, CommitOutcome, RevisionStore};
use crate::error::StoreError;

/// Revision store for tests and single-process development.
#[derive(Debug, Default)]
pub struct InMemoryRevisionStore {
    canvases: RwLock<HashMap<ResourceId, CanvasLog>>,
}

impl InMemoryRevisionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, canvas_id: &ResourceId, f: impl FnOnce(Option<&CanvasLog>) -> T) -> Result<T, StoreError> {
        let canvases = self.canvases.read().map_err(|_| StoreError::poisoned("revision"))?;
        Ok(f(canvases.get(canvas_id)))
    }
}

#[async_trait]
impl RevisionStore for InMemoryRevisionStore {
    async fn head(&self, canvas_id: &ResourceId) -> Result<CanvasRevision, StoreError> {
        // A canvas only takes memory once something is committed to it.
        self.read(canvas_id, |log| match log {
            Some(log) => log.head().clone(),
            None => CanvasRevision::initial(canvas_id.clone()),
        })
    }

    async fn idempotent_result(
        &self,
        canvas_id: &ResourceId,
        idempotency_key: &str,
    ) -> Result<Option<RevisionResult>, StoreError> {
        self.read(canvas_id, |log| log.and_then(|l| l.idempotent_result(idempotency_key)))
    }

    async fn ops_after(
        &self,
        canvas_id: &ResourceId,
        base_rev: u64,
    ) -> Result<Vec<OpLogEntry>, StoreError> {
        self.read(canvas_id, |log| log.map(|l| l.ops_after(base_rev)).unwrap_or_default())
    }

    async fn commit(&self, commit: Commit) -> Result<CommitOutcome, StoreError> {
        let mut canvases = self.canvases.write().map_err(|_| StoreError::poisoned("revision"))?;
        let log = canvases
            .entry(commit.canvas_id.clone())
            .or_insert_with(|| CanvasLog::new(commit.canvas_id.clone()));

        let key = commit.idempotency_key.clone();
        match log.prepare(commit) {
            Ok(entry) => {
                log.push(entry, key);
                Ok(CommitOutcome::Committed(log.head().clone()))
            }
            Err(outcome) => Ok(outcome),
        }
    }
}

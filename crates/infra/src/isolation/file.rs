//! Ownership records kept in one JSON document, rewritten atomically on every
//! new claim. Single-process: the document is cached and not re-read.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use atrium_core::{ResourceId, ResourceKind, TenantId};

use super::{Claim, OwnershipStore};
use crate::error::StoreError;
use crate::jsonl;

const DOCUMENT: &str = "ownership.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct OwnershipDocument {
    #[serde(default)]
    canvas: BTreeMap<ResourceId, TenantId>,
    #[serde(default)]
    thread: BTreeMap<ResourceId, TenantId>,
}

impl OwnershipDocument {
    fn table(&self, kind: ResourceKind) -> &BTreeMap<ResourceId, TenantId> {
        match kind {
            ResourceKind::Canvas => &self.canvas,
            ResourceKind::Thread => &self.thread,
        }
    }

    fn table_mut(&mut self, kind: ResourceKind) -> &mut BTreeMap<ResourceId, TenantId> {
        match kind {
            ResourceKind::Canvas => &mut self.canvas,
            ResourceKind::Thread => &mut self.thread,
        }
    }
}

#[derive(Debug)]
pub struct FileOwnershipStore {
    path: PathBuf,
    doc: Mutex<OwnershipDocument>,
}

impl FileOwnershipStore {
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref();
        jsonl::ensure_dir(dir).await?;
        let path = dir.join(DOCUMENT);
        let doc = match tokio::fs::read(&path).await {
            Ok(raw) => serde_json::from_slice(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => OwnershipDocument::default(),
            Err(e) => return Err(StoreError::io("read ownership")(e)),
        };
        Ok(Self {
            path,
            doc: Mutex::new(doc),
        })
    }
}

#[async_trait]
impl OwnershipStore for FileOwnershipStore {
    async fn owner(
        &self,
        kind: ResourceKind,
        resource_id: &ResourceId,
    ) -> Result<Option<TenantId>, StoreError> {
        Ok(self.doc.lock().await.table(kind).get(resource_id).cloned())
    }

    async fn claim(
        &self,
        kind: ResourceKind,
        resource_id: &ResourceId,
        tenant_id: &TenantId,
    ) -> Result<Claim, StoreError> {
        let mut doc = self.doc.lock().await;
        if let Some(owner) = doc.table(kind).get(resource_id) {
            return Ok(Claim {
                owner: owner.clone(),
                created: false,
            });
        }

        doc.table_mut(kind).insert(resource_id.clone(), tenant_id.clone());
        if let Err(e) = jsonl::write_atomic(&self.path, &*doc).await {
            // Keep memory and disk in agreement.
            doc.table_mut(kind).remove(resource_id);
            return Err(e);
        }
        Ok(Claim {
            owner: tenant_id.clone(),
            created: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn claims_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let tenant = TenantId::new("t_A").unwrap();
        let canvas = ResourceId::new("c1").unwrap();

        {
            let store = FileOwnershipStore::open(dir.path()).await.unwrap();
            let claim = store.claim(ResourceKind::Canvas, &canvas, &tenant).await.unwrap();
            assert!(claim.created);
        }

        let store = FileOwnershipStore::open(dir.path()).await.unwrap();
        assert_eq!(
            store.owner(ResourceKind::Canvas, &canvas).await.unwrap(),
            Some(tenant.clone())
        );
        assert_eq!(store.owner(ResourceKind::Thread, &canvas).await.unwrap(), None);

        let other = TenantId::new("t_B").unwrap();
        let claim = store.claim(ResourceKind::Canvas, &canvas, &other).await.unwrap();
        assert_eq!(claim, Claim { owner: tenant, created: false });
    }
}

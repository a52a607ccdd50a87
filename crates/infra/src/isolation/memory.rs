use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use atrium_core::{ResourceId, ResourceKind, TenantId};

use super::{Claim, OwnershipStore};
use crate::error::StoreError;

#[derive(Debug, Default)]
pub struct InMemoryOwnershipStore {
    owners: RwLock<HashMap<(ResourceKind, ResourceId), TenantId>>,
}

impl InMemoryOwnershipStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OwnershipStore for InMemoryOwnershipStore {
    async fn owner(
        &self,
        kind: ResourceKind,
        resource_id: &ResourceId,
    ) -> Result<Option<TenantId>, StoreError> {
        let owners = self.owners.read().map_err(|_| StoreError::poisoned("ownership"))?;
        Ok(owners.get(&(kind, resource_id.clone())).cloned())
    }

    async fn claim(
        &self,
        kind: ResourceKind,
        resource_id: &ResourceId,
        tenant_id: &TenantId,
    ) -> Result<Claim, StoreError> {
        let mut owners = self.owners.write().map_err(|_| StoreError::poisoned("ownership"))?;
        let key = (kind, resource_id.clone());
        if let Some(owner) = owners.get(&key) {
            return Ok(Claim {
                owner: owner.clone(),
                created: false,
            });
        }
        owners.insert(key, tenant_id.clone());
        Ok(Claim {
            owner: tenant_id.clone(),
            created: true,
        })
    }
}

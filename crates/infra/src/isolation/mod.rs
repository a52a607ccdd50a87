//! Tenant isolation: who owns which resource, and whether a caller may
//! touch it.
//!
//! Unknown resources and resources owned by another tenant are reported with
//! the same `NotFound`, so a caller can never learn that a foreign resource
//! exists.

pub mod file;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;

use atrium_auth::RequestContext;
use atrium_core::{RealtimeError, ResourceId, ResourceKind, TenantId};
use atrium_events::RoutingKeys;

use crate::error::StoreError;

pub use file::FileOwnershipStore;
pub use memory::InMemoryOwnershipStore;

/// Result of an insert-if-absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    pub owner: TenantId,
    pub created: bool,
}

/// Persistence of ownership records. Records are written once and never
/// overwritten.
#[async_trait]
pub trait OwnershipStore: Send + Sync {
    async fn owner(
        &self,
        kind: ResourceKind,
        resource_id: &ResourceId,
    ) -> Result<Option<TenantId>, StoreError>;

    /// Record `tenant_id` as owner unless the resource already has one.
    async fn claim(
        &self,
        kind: ResourceKind,
        resource_id: &ResourceId,
        tenant_id: &TenantId,
    ) -> Result<Claim, StoreError>;
}

#[async_trait]
impl<S> OwnershipStore for Arc<S>
where
    S: OwnershipStore + ?Sized,
{
    async fn owner(
        &self,
        kind: ResourceKind,
        resource_id: &ResourceId,
    ) -> Result<Option<TenantId>, StoreError> {
        (**self).owner(kind, resource_id).await
    }

    async fn claim(
        &self,
        kind: ResourceKind,
        resource_id: &ResourceId,
        tenant_id: &TenantId,
    ) -> Result<Claim, StoreError> {
        (**self).claim(kind, resource_id, tenant_id).await
    }
}

#[derive(Clone)]
pub struct IsolationRegistry {
    store: Arc<dyn OwnershipStore>,
}

impl IsolationRegistry {
    pub fn new(store: Arc<dyn OwnershipStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryOwnershipStore::new()))
    }

    /// Register `resource_id` under `tenant_id`.
    ///
    /// Repeating the call for the same tenant is a no-op. A resource already
    /// owned by another tenant answers `NotFound`.
    pub async fn register(
        &self,
        tenant_id: &TenantId,
        resource_id: &ResourceId,
        kind: ResourceKind,
    ) -> Result<(), RealtimeError> {
        let claim = self.store.claim(kind, resource_id, tenant_id).await?;
        if &claim.owner != tenant_id {
            tracing::warn!(%tenant_id, %resource_id, %kind, "registration of foreign-owned resource refused");
            return Err(RealtimeError::not_found());
        }
        if claim.created {
            tracing::info!(%tenant_id, %resource_id, %kind, "resource registered");
        }
        Ok(())
    }

    pub async fn get_owner(
        &self,
        resource_id: &ResourceId,
        kind: ResourceKind,
    ) -> Result<Option<TenantId>, RealtimeError> {
        Ok(self.store.owner(kind, resource_id).await?)
    }

    pub async fn verify_access(
        &self,
        tenant_id: &TenantId,
        resource_id: &ResourceId,
        kind: ResourceKind,
    ) -> Result<(), RealtimeError> {
        match self.store.owner(kind, resource_id).await? {
            Some(owner) if &owner == tenant_id => Ok(()),
            _ => Err(RealtimeError::not_found()),
        }
    }

    /// Check that `routing` addresses the caller's own tenant and env.
    ///
    /// Env values are compared in their normalized form (`stage` is
    /// `staging`), which `Env` guarantees at parse time.
    pub fn validate_routing(
        &self,
        ctx: &RequestContext,
        routing: &RoutingKeys,
    ) -> Result<(), RealtimeError> {
        if routing.tenant_id != ctx.tenant_id {
            return Err(RealtimeError::access_denied(format!(
                "routing tenant '{}' does not match caller tenant",
                routing.tenant_id
            )));
        }
        if routing.env != ctx.env {
            return Err(RealtimeError::access_denied(format!(
                "routing env '{}' does not match caller env '{}'",
                routing.env, ctx.env
            )));
        }
        Ok(())
    }
}

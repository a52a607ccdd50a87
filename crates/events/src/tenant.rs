use atrium_core::TenantId;

use crate::bus::LiveEvent;
use crate::envelope::StreamEvent;

/// Messages that belong to exactly one tenant.
///
/// Live consumers use this to drop anything not addressed to the tenant they
/// serve, even when it arrives on a shared bus.
pub trait TenantScoped {
    fn tenant_id(&self) -> &TenantId;

    fn belongs_to(&self, tenant_id: &TenantId) -> bool {
        self.tenant_id() == tenant_id
    }
}

impl TenantScoped for StreamEvent {
    fn tenant_id(&self) -> &TenantId {
        &self.routing().tenant_id
    }
}

impl TenantScoped for LiveEvent {
    fn tenant_id(&self) -> &TenantId {
        self.event.tenant_id()
    }
}

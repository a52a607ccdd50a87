//! Policy/quota gate consulted before any mutation.
//!
//! Gates are pure decisions over the caller's context and the action it asks
//! for. Their errors are surfaced to clients unmodified.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use thiserror::Error;

use atrium_core::TenantId;

use crate::RequestContext;

/// What a caller is about to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateRequest<'a> {
    pub action: &'a str,
    pub surface: Option<&'a str>,
    pub subject_type: &'a str,
    pub subject_id: &'a str,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GateError {
    #[error("action '{action}' denied: {reason}")]
    Denied { action: String, reason: String },

    #[error("quota exceeded for '{action}' (limit {limit})")]
    QuotaExceeded { action: String, limit: u64 },
}

pub trait PolicyGate: Send + Sync {
    fn run(&self, ctx: &RequestContext, request: &GateRequest<'_>) -> Result<(), GateError>;
}

impl<G> PolicyGate for Arc<G>
where
    G: PolicyGate + ?Sized,
{
    fn run(&self, ctx: &RequestContext, request: &GateRequest<'_>) -> Result<(), GateError> {
        (**self).run(ctx, request)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAllGate;

impl PolicyGate for AllowAllGate {
    fn run(&self, _ctx: &RequestContext, _request: &GateRequest<'_>) -> Result<(), GateError> {
        Ok(())
    }
}

/// Denies listed actions, or everything for listed tenants.
#[derive(Debug, Default, Clone)]
pub struct DenyListGate {
    actions: HashSet<String>,
    tenants: HashSet<TenantId>,
}

impl DenyListGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deny_action(mut self, action: impl Into<String>) -> Self {
        self.actions.insert(action.into());
        self
    }

    pub fn deny_tenant(mut self, tenant_id: TenantId) -> Self {
        self.tenants.insert(tenant_id);
        self
    }
}

impl PolicyGate for DenyListGate {
    fn run(&self, ctx: &RequestContext, request: &GateRequest<'_>) -> Result<(), GateError> {
        let reason = if self.tenants.contains(&ctx.tenant_id) {
            "tenant is suspended"
        } else if self.actions.contains(request.action) {
            "action is disabled"
        } else {
            return Ok(());
        };
        tracing::debug!(action = request.action, tenant_id = %ctx.tenant_id, reason, "gate denied");
        Err(GateError::Denied {
            action: request.action.to_string(),
            reason: reason.to_string(),
        })
    }
}

/// Fixed per-tenant allowance of gated actions for the process lifetime.
#[derive(Debug)]
pub struct QuotaGate {
    limit: u64,
    used: Mutex<HashMap<TenantId, u64>>,
}

impl QuotaGate {
    pub fn new(limit: u64) -> Self {
        Self {
            limit,
            used: Mutex::new(HashMap::new()),
        }
    }
}

impl PolicyGate for QuotaGate {
    fn run(&self, ctx: &RequestContext, request: &GateRequest<'_>) -> Result<(), GateError> {
        let exceeded = || GateError::QuotaExceeded {
            action: request.action.to_string(),
            limit: self.limit,
        };
        let mut used = self.used.lock().map_err(|_| exceeded())?;
        let count = used.entry(ctx.tenant_id.clone()).or_insert(0);
        if *count >= self.limit {
            return Err(exceeded());
        }
        *count += 1;
        Ok(())
    }
}

/// Runs gates in order; the first error wins.
#[derive(Default, Clone)]
pub struct GateChain {
    gates: Vec<Arc<dyn PolicyGate>>,
}

impl GateChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, gate: Arc<dyn PolicyGate>) -> Self {
        self.gates.push(gate);
        self
    }
}

impl PolicyGate for GateChain {
    fn run(&self, ctx: &RequestContext, request: &GateRequest<'_>) -> Result<(), GateError> {
        self.gates.iter().try_for_each(|gate| gate.run(ctx, request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atrium_core::UserId;

    fn ctx(tenant: &str) -> RequestContext {
        RequestContext::new(TenantId::new(tenant).unwrap(), UserId::new("u1").unwrap())
    }

    fn request(action: &str) -> GateRequest<'_> {
        GateRequest {
            action,
            surface: None,
            subject_type: "canvas",
            subject_id: "c1",
        }
    }

    #[test]
    fn deny_list_blocks_actions_and_tenants() {
        let gate = DenyListGate::new()
            .deny_action("canvas.delete")
            .deny_tenant(TenantId::new("t_B").unwrap());

        assert!(gate.run(&ctx("t_A"), &request("canvas.apply")).is_ok());
        assert!(matches!(
            gate.run(&ctx("t_A"), &request("canvas.delete")),
            Err(GateError::Denied { .. })
        ));
        assert!(gate.run(&ctx("t_B"), &request("canvas.apply")).is_err());
    }

    #[test]
    fn quota_is_per_tenant() {
        let gate = QuotaGate::new(1);
        assert!(gate.run(&ctx("t_A"), &request("canvas.apply")).is_ok());
        assert_eq!(
            gate.run(&ctx("t_A"), &request("canvas.apply")),
            Err(GateError::QuotaExceeded {
                action: "canvas.apply".into(),
                limit: 1
            })
        );
        assert!(gate.run(&ctx("t_B"), &request("canvas.apply")).is_ok());
    }

    #[test]
    fn chain_stops_at_first_failure() {
        let quota = Arc::new(QuotaGate::new(5));
        let chain = GateChain::new()
            .with(Arc::new(DenyListGate::new().deny_action("canvas.apply")))
            .with(quota.clone());

        assert!(chain.run(&ctx("t_A"), &request("canvas.apply")).is_err());
        // The quota gate never ran, so the whole allowance is left.
        for _ in 0..5 {
            assert!(quota.run(&ctx("t_A"), &request("x")).is_ok());
        }
    }
}

use serde::{Deserialize, Serialize};

use atrium_core::{TenantId, UserId};
use atrium_events::{Env, EventIds, RoutingKeys};

/// Identity and scope of the caller, resolved upstream of this crate.
///
/// Everything the core reads or writes is checked against this: the tenant is
/// authoritative, and `mode`/`project_id` narrow the scope when present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    #[serde(default)]
    pub env: Env,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub surface_id: Option<String>,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub trace_id: Option<String>,
}

impl RequestContext {
    pub fn new(tenant_id: TenantId, user_id: UserId) -> Self {
        Self {
            tenant_id,
            user_id,
            env: Env::default(),
            mode: None,
            project_id: None,
            surface_id: None,
            request_id: None,
            trace_id: None,
        }
    }

    pub fn with_env(mut self, env: Env) -> Self {
        self.env = env;
        self
    }

    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    /// Routing keys for events produced on behalf of this caller.
    pub fn routing_keys(&self) -> RoutingKeys {
        let mut keys = RoutingKeys::new(self.tenant_id.clone(), self.env);
        keys.mode = self.mode.clone();
        keys.project_id = self.project_id.clone();
        keys.surface_id = self.surface_id.clone();
        keys.actor_id = Some(self.user_id.to_string());
        keys
    }

    /// Correlation ids carried from the request onto produced events.
    pub fn event_ids(&self) -> EventIds {
        EventIds {
            request_id: self.request_id.clone(),
            correlation_id: self.request_id.clone(),
            ..EventIds::default()
        }
    }
}

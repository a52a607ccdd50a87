//! Routing keys: the scope every event and command is addressed to.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use atrium_core::{RealtimeError, ResourceId, TenantId};

/// Deployment environment.
///
/// `"stage"` is accepted as an alias of `"staging"` everywhere an env is
/// parsed, so comparisons always happen on the normalized value. Headers and
/// JSON bodies go through the same `FromStr`.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Env {
    #[default]
    Dev,
    Staging,
    Prod,
}

impl Env {
    pub fn as_str(&self) -> &'static str {
        match self {
            Env::Dev => "dev",
            Env::Staging => "staging",
            Env::Prod => "prod",
        }
    }
}

impl core::fmt::Display for Env {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Env {
    type Err = RealtimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" => Ok(Env::Dev),
            "staging" | "stage" => Ok(Env::Staging),
            "prod" => Ok(Env::Prod),
            other => Err(RealtimeError::validation(format!(
                "unknown env '{other}' (expected dev, staging or prod)"
            ))),
        }
    }
}

impl TryFrom<String> for Env {
    type Error = RealtimeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Who produced an event.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorType {
    #[default]
    Human,
    Agent,
    System,
}

/// Addressing scope of an event or command.
///
/// `tenant_id` must equal the authenticated tenant wherever the keys are used;
/// the isolation registry enforces that before anything is read or written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingKeys {
    pub tenant_id: TenantId,
    #[serde(default)]
    pub env: Env,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surface_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canvas_id: Option<ResourceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<ResourceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    #[serde(default)]
    pub actor_type: ActorType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

impl RoutingKeys {
    pub fn new(tenant_id: TenantId, env: Env) -> Self {
        Self {
            tenant_id,
            env,
            mode: None,
            project_id: None,
            app_id: None,
            surface_id: None,
            canvas_id: None,
            thread_id: None,
            actor_id: None,
            actor_type: ActorType::Human,
            session_id: None,
            device_id: None,
        }
    }

    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_canvas(mut self, canvas_id: ResourceId) -> Self {
        self.canvas_id = Some(canvas_id);
        self
    }

    pub fn with_thread(mut self, thread_id: ResourceId) -> Self {
        self.thread_id = Some(thread_id);
        self
    }

    pub fn with_actor(mut self, actor_id: impl Into<String>, actor_type: ActorType) -> Self {
        self.actor_id = Some(actor_id.into());
        self.actor_type = actor_type;
        self
    }
}

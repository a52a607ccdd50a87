//! Strongly-typed identifiers used across the realtime core.
//!
//! Tenant, user and resource identifiers are opaque client-chosen strings
//! (`"t_A"`, `"th-1"`), validated once at the boundary. Event identifiers are
//! generated as UUIDv7 strings but parse from any valid text so that stale or
//! foreign cursors can be reported as such instead of failing to parse.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RealtimeError;

/// Maximum byte length of a single identifier.
pub const MAX_ID_LEN: usize = 128;

/// Identifier of a tenant (multi-tenant boundary).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

/// Identifier of a user (actor identity).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

/// Identifier of a tenant-owned resource (canvas, thread).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceId(String);

/// Globally unique, immutable identifier of a stream event. Doubles as the
/// replay cursor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EventId(String);

fn validate_id(name: &str, value: &str, max_len: usize) -> Result<(), RealtimeError> {
    if value.is_empty() {
        return Err(RealtimeError::validation(format!("{name} must not be empty")));
    }
    if value.len() > max_len {
        return Err(RealtimeError::validation(format!(
            "{name} exceeds {max_len} bytes"
        )));
    }
    if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(RealtimeError::validation(format!(
            "{name} must not contain whitespace or control characters"
        )));
    }
    Ok(())
}

macro_rules! impl_string_id {
    ($t:ty, $name:literal) => {
        impl $t {
            pub fn new(value: impl Into<String>) -> Result<Self, RealtimeError> {
                let value = value.into();
                validate_id($name, &value, MAX_ID_LEN)?;
                Ok(Self(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $t {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $t {
            type Error = RealtimeError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$t> for String {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = RealtimeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }
    };
}

impl_string_id!(TenantId, "tenant_id");
impl_string_id!(UserId, "user_id");
impl_string_id!(ResourceId, "resource_id");
impl_string_id!(EventId, "event_id");

impl EventId {
    /// Generate a fresh, time-ordered event id (UUIDv7).
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }
}

/// Kind of a tenant-owned resource.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Canvas,
    Thread,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Canvas => "canvas",
            ResourceKind::Thread => "thread",
        }
    }
}

impl core::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = RealtimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "canvas" => Ok(ResourceKind::Canvas),
            "thread" => Ok(ResourceKind::Thread),
            other => Err(RealtimeError::validation(format!(
                "unknown resource kind '{other}' (expected canvas or thread)"
            ))),
        }
    }
}

/// Identifier of an append-only event stream.
///
/// Resource streams are named `<kind>:<resource_id>`; arbitrary stream ids are
/// accepted as long as they pass identifier validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StreamId(String);

impl StreamId {
    pub fn new(value: impl Into<String>) -> Result<Self, RealtimeError> {
        let value = value.into();
        validate_id("stream_id", &value, MAX_ID_LEN + 16)?;
        Ok(Self(value))
    }

    /// The stream carrying a resource's events.
    pub fn for_resource(kind: ResourceKind, resource_id: &ResourceId) -> Self {
        Self(format!("{}:{}", kind.as_str(), resource_id.as_str()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for StreamId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for StreamId {
    type Error = RealtimeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<StreamId> for String {
    fn from(value: StreamId) -> Self {
        value.0
    }
}

impl FromStr for StreamId {
    type Err = RealtimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn rejects_empty_and_whitespace_ids() {
        assert!(TenantId::new("").is_err());
        assert!(TenantId::new("t A").is_err());
        assert!(ResourceId::new("c1\n").is_err());
        assert!(UserId::new("u".repeat(MAX_ID_LEN + 1)).is_err());
        assert!(TenantId::new("t_A").is_ok());
    }

    #[test]
    fn deserialization_validates() {
        let ok: TenantId = serde_json::from_str("\"t_A\"").unwrap();
        assert_eq!(ok.as_str(), "t_A");
        assert!(serde_json::from_str::<TenantId>("\"\"").is_err());
    }

    #[test]
    fn resource_streams_are_namespaced_by_kind() {
        let id = ResourceId::new("th-1").unwrap();
        assert_eq!(StreamId::for_resource(ResourceKind::Thread, &id).as_str(), "thread:th-1");
        assert_eq!(StreamId::for_resource(ResourceKind::Canvas, &id).as_str(), "canvas:th-1");
    }

    #[test]
    fn generated_event_ids_are_unique() {
        let a = EventId::generate();
        let b = EventId::generate();
        assert_ne!(a, b);
        assert!(EventId::new(a.as_str()).is_ok());
    }

    proptest! {
        #[test]
        fn any_visible_ascii_id_is_accepted(s in "[!-~]{1,128}") {
            prop_assert!(ResourceId::new(s.clone()).is_ok());
            let id = ResourceId::new(s.clone()).unwrap();
            prop_assert_eq!(id.as_str(), s.as_str());
        }
    }
}

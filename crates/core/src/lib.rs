//! `atrium-core`: foundation primitives for the realtime core.
//!
//! This crate contains **pure** building blocks (no infrastructure concerns):
//! identifiers and the error taxonomy shared by every other crate.

pub mod error;
pub mod id;

pub use error::{RealtimeError, RealtimeResult};
pub use id::{EventId, ResourceId, ResourceKind, StreamId, TenantId, UserId};

//! `atrium-auth`: the caller context and the policy gate boundary.
//!
//! Identity resolution itself happens upstream; this crate only models what
//! it produces and what the core asks of it.

pub mod context;
pub mod gate;

pub use context::RequestContext;
pub use gate::{AllowAllGate, DenyListGate, GateChain, GateError, GateRequest, PolicyGate, QuotaGate};

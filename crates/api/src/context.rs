//! Caller identity, taken from headers set by the upstream gateway.
//!
//! Authentication happens before requests reach this service; the headers
//! below are trusted as-is.

use axum::http::HeaderMap;

use atrium_auth::RequestContext;
use atrium_core::{TenantId, UserId};
use atrium_events::Env;

pub const TENANT_HEADER: &str = "x-tenant-id";
pub const USER_HEADER: &str = "x-user-id";
pub const ENV_HEADER: &str = "x-env";
pub const MODE_HEADER: &str = "x-mode";
pub const PROJECT_HEADER: &str = "x-project-id";
pub const SURFACE_HEADER: &str = "x-surface-id";
pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const TRACE_ID_HEADER: &str = "x-trace-id";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    /// Tenant or user missing or malformed.
    Unauthenticated,
    /// An optional header is present but invalid.
    Invalid(String),
}

pub fn context_from_headers(headers: &HeaderMap) -> Result<RequestContext, ContextError> {
    let tenant_id = header(headers, TENANT_HEADER)
        .and_then(|v| TenantId::new(v).ok())
        .ok_or(ContextError::Unauthenticated)?;
    let user_id = header(headers, USER_HEADER)
        .and_then(|v| UserId::new(v).ok())
        .ok_or(ContextError::Unauthenticated)?;

    let mut ctx = RequestContext::new(tenant_id, user_id);
    if let Some(env) = header(headers, ENV_HEADER) {
        ctx.env = env
            .parse::<Env>()
            .map_err(|e| ContextError::Invalid(e.to_string()))?;
    }
    ctx.mode = header(headers, MODE_HEADER).map(str::to_string);
    ctx.project_id = header(headers, PROJECT_HEADER).map(str::to_string);
    ctx.surface_id = header(headers, SURFACE_HEADER).map(str::to_string);
    ctx.request_id = header(headers, REQUEST_ID_HEADER).map(str::to_string);
    ctx.trace_id = header(headers, TRACE_ID_HEADER).map(str::to_string);
    Ok(ctx)
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

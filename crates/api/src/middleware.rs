use axum::{http::StatusCode, middleware::Next, response::Response};

use crate::app::errors::json_error;
use crate::context::{ContextError, context_from_headers};

/// Resolve the caller's `RequestContext` and attach it to the request.
pub async fn context_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    match context_from_headers(req.headers()) {
        Ok(ctx) => {
            req.extensions_mut().insert(ctx);
            next.run(req).await
        }
        Err(ContextError::Unauthenticated) => json_error(
            StatusCode::UNAUTHORIZED,
            "unauthenticated",
            "x-tenant-id and x-user-id are required",
        ),
        Err(ContextError::Invalid(msg)) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
    }
}

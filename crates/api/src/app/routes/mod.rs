use axum::{
    Router,
    routing::{get, post},
};

pub mod canvases;
pub mod common;
pub mod resources;
pub mod streams;
pub mod system;
pub mod threads;

/// Router for all caller-scoped endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/resources/:kind/:id", post(resources::register))
        .route("/canvases/:id/commands", post(canvases::apply_command))
        .route("/canvases/:id/revision", get(canvases::revision))
        .route("/streams/:kind/:id/events", get(streams::list_events))
        .route("/streams/:kind/:id/live", get(streams::live))
        .route("/threads/:id/messages", post(threads::post_message))
}

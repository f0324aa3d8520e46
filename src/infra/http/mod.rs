//! JSON API surface.
//!
//! One generic route pair serves every registered resource; the
//! `{resource}` segment is resolved against the registry per request.

mod error;
mod handlers;
mod middleware;
mod models;

pub use error::ApiError;
pub use models::{ErrorEnvelope, ResourceEnvelope};

use std::sync::Arc;

use axum::{Router, routing::get};

use crate::application::{DocumentStore, ResourceRegistry, ResourceService};

#[derive(Clone)]
pub struct AppState {
    pub resources: Arc<ResourceService>,
    pub registry: Arc<ResourceRegistry>,
    pub store: Arc<dyn DocumentStore>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(handlers::health))
        .route(
            "/api/v1/{resource}",
            get(handlers::list).post(handlers::create),
        )
        .route(
            "/api/v1/{resource}/{id}",
            get(handlers::get_by_id)
                .patch(handlers::update)
                .delete(handlers::delete),
        )
        // Unmatched paths and unsupported methods both answer with
        // the same not-found envelope.
        .fallback(handlers::fallback)
        .method_not_allowed_fallback(handlers::fallback)
        .with_state(state)
        .layer(axum::middleware::from_fn(middleware::track_requests))
}

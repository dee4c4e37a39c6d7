//! Social media post service: HTTP API library.
//!
//! Exposes the router, configuration and process wiring so that integration
//! tests can drive the same application the binary serves.

pub mod app;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod telemetry;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Builds the full router: health, post commands and post lookups.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(routes::health::router())
        .nest("/api/v1/posts", routes::posts::router())
        .nest("/api/v1/post-lookup", routes::post_lookup::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

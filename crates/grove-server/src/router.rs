//! Axum router setup for the grove server

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;

use crate::ServerState;
use crate::handlers::{get_orphans, get_overlays, get_view_diagnostics, get_views, get_watch_patterns, health_check};

/// Create the axum router with all routes
pub fn create_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/views", get(get_views))
        .route("/api/views/:id/diagnostics", get(get_view_diagnostics))
        .route("/api/overlays", get(get_overlays))
        .route("/api/watch-patterns", get(get_watch_patterns))
        .route("/api/orphans", get(get_orphans))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

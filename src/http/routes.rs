//! Axum router configuration

use axum::{
    http::{header, Method},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::service::SubtitleService;

use super::handlers::{convert, get_subtitle, health_check, lock_stats, version_check};

/// Create the Axum router with all routes
pub fn create_router(service: Arc<SubtitleService>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS, Method::HEAD])
        .allow_headers([header::ACCEPT, header::CONTENT_TYPE, header::ORIGIN])
        .max_age(Duration::from_secs(3600));

    Router::new()
        // Health and version endpoints
        .route("/health", get(health_check))
        .route("/version", get(version_check))
        // Debug endpoints
        .route("/debug/locks", get(lock_stats))
        // Public operations
        .route(
            "/items/{item_id}/{source_id}/subtitles/{index}/{file}",
            get(get_subtitle),
        )
        .route("/convert/{from}/{to}", post(convert))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // State
        .with_state(service)
}

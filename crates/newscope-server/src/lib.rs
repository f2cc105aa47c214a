//! Newscope HTTP API server.
//!
//! Exposes the curated corpus as a JSON API and filtered RSS feeds, and
//! accepts feedback and feed management requests that flow back into the
//! pipeline.

pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the complete axum router with all API routes and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    let request_timeout = Duration::from_secs(state.config.server.timeout.max(1));
    Router::new()
        .route("/ping", get(routes::health::ping))
        .route("/api/v1/status", get(routes::status::status))
        .route("/api/v1/items", get(routes::items::list_items))
        .route("/api/v1/topics", get(routes::items::list_topics))
        .route(
            "/api/v1/feedback/{id}/{action}",
            post(routes::feedback::submit_feedback),
        )
        .route("/api/v1/extract/{id}", post(routes::extract::trigger_extract))
        .route(
            "/api/v1/feeds",
            get(routes::feeds::list_feeds).post(routes::feeds::create_feed),
        )
        .route(
            "/api/v1/feeds/{id}",
            get(routes::feeds::get_feed)
                .put(routes::feeds::update_feed)
                .delete(routes::feeds::delete_feed),
        )
        .route(
            "/api/v1/preferences",
            get(routes::preferences::get_preferences)
                .put(routes::preferences::update_preferences)
                .delete(routes::preferences::reset_preferences),
        )
        .route("/rss", get(routes::rss::feed))
        .route("/rss/{topic}", get(routes::rss::feed_by_topic))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Returns the version of the newscope server.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

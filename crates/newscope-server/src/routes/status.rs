//! Instance status endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use newscope_core::storage::{feeds, items};
use serde::Serialize;

use crate::error::ApiError;
use crate::state::AppState;

/// Response body for GET /api/v1/status.
#[derive(Serialize)]
pub struct StatusResponse {
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub feeds: i64,
    pub items_total: i64,
    pub items_classified: i64,
}

/// GET /api/v1/status
pub async fn status(State(state): State<Arc<AppState>>) -> Result<Json<StatusResponse>, ApiError> {
    let feeds = feeds::count_feeds(&state.db).await?;
    let items_total = items::count_items(&state.db).await?;
    let items_classified = items::count_classified(&state.db).await?;

    Ok(Json(StatusResponse {
        version: crate::version(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        feeds,
        items_total,
        items_classified,
    }))
}

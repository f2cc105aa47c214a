//! Preference-summary management endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use newscope_core::error::StorageError;
use newscope_core::retry::retry;
use newscope_core::storage::settings::{
    load_preference_summary, reset_preference_summary, store_preference_summary,
    PreferenceSummary,
};
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::AppState;

/// GET /api/v1/preferences
pub async fn get_preferences(
    State(state): State<Arc<AppState>>,
) -> Result<Json<PreferenceSummary>, ApiError> {
    Ok(Json(load_preference_summary(&state.db).await?))
}

/// Request body for PUT /api/v1/preferences.
#[derive(Deserialize)]
pub struct UpdatePreferencesRequest {
    /// New summary text; omitted fields are left unchanged.
    pub summary: Option<String>,
    /// Whether the summary is used in classification prompts.
    pub enabled: Option<bool>,
}

/// PUT /api/v1/preferences
pub async fn update_preferences(
    State(state): State<Arc<AppState>>,
    Json(body): Json<UpdatePreferencesRequest>,
) -> Result<Json<PreferenceSummary>, ApiError> {
    let mut record = load_preference_summary(&state.db).await?;
    if let Some(summary) = body.summary {
        record.summary = summary;
        record.last_updated_at = Some(newscope_core::storage::now_timestamp());
    }
    if let Some(enabled) = body.enabled {
        record.enabled = enabled;
    }

    let policy = state.retry_policy();
    retry(&policy, StorageError::is_contended, || {
        store_preference_summary(&state.db, &record)
    })
    .await?;

    Ok(Json(record))
}

/// DELETE /api/v1/preferences
pub async fn reset_preferences(
    State(state): State<Arc<AppState>>,
) -> Result<StatusCode, ApiError> {
    let policy = state.retry_policy();
    retry(&policy, StorageError::is_contended, || {
        reset_preference_summary(&state.db)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

//! On-demand extraction endpoint.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use newscope_core::error::StorageError;
use newscope_core::retry::retry;
use newscope_core::storage::action_log;
use newscope_core::storage::items::{get_item, reset_item_extraction};

use crate::error::ApiError;
use crate::state::AppState;

/// POST /api/v1/extract/{id}
///
/// Clears any previous extraction attempt and hands the item to the
/// extraction loop out of band.
pub async fn trigger_extract(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if !state.config.extraction.enabled {
        return Err(ApiError::BadRequest(
            "extraction is disabled in the configuration".to_string(),
        ));
    }

    if get_item(&state.db, id).await?.is_none() {
        return Err(ApiError::NotFound(format!("item {id} not found")));
    }

    let policy = state.retry_policy();
    retry(&policy, StorageError::is_contended, || {
        reset_item_extraction(&state.db, id)
    })
    .await?;

    state.extract_tx.try_send(id).map_err(|_| {
        ApiError::Unavailable("extraction queue is full, retry shortly".to_string())
    })?;

    if let Err(e) =
        action_log::log_action(&state.db, "extract", "queued", &format!("item {id}")).await
    {
        tracing::warn!(error = %e, "Failed to log extraction request");
    }

    Ok(StatusCode::ACCEPTED)
}

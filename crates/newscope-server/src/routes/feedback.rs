//! User feedback endpoint.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use newscope_core::error::StorageError;
use newscope_core::retry::retry;
use newscope_core::storage::action_log;
use newscope_core::storage::items::{set_item_feedback, Feedback};

use crate::error::ApiError;
use crate::state::AppState;

/// POST /api/v1/feedback/{id}/{action}
///
/// `action` is one of `like`, `dislike`, `unset`. Like/dislike events
/// feed the preference maintainer's counter; unset does not.
pub async fn submit_feedback(
    State(state): State<Arc<AppState>>,
    Path((id, action)): Path<(i64, String)>,
) -> Result<StatusCode, ApiError> {
    let feedback = Feedback::parse(&action).ok_or_else(|| {
        ApiError::BadRequest(format!(
            "unknown feedback action '{action}' (use like, dislike, or unset)"
        ))
    })?;

    let policy = state.retry_policy();
    let updated = retry(&policy, StorageError::is_contended, || {
        set_item_feedback(&state.db, id, feedback)
    })
    .await?;
    if !updated {
        return Err(ApiError::NotFound(format!("item {id} not found")));
    }

    if let Err(e) = action_log::log_action(
        &state.db,
        "feedback",
        "success",
        &format!("{} item {id}", feedback.as_str()),
    )
    .await
    {
        tracing::warn!(error = %e, "Failed to log feedback action");
    }

    if feedback != Feedback::None {
        // Best-effort: a full channel only delays the summary update.
        if state.feedback_tx.try_send(()).is_err() {
            tracing::debug!("Feedback channel full, event dropped");
        }
    }

    Ok(StatusCode::NO_CONTENT)
}

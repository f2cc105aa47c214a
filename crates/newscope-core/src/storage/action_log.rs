//! Audit trail of user and pipeline actions.
//!
//! Feedback events, on-demand extractions, and cleanup passes log here;
//! the retention loop prunes entries past the configured horizon.

use super::DbPool;
use crate::error::StorageError;

/// One logged action.
#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct ActionEntry {
    /// Row ID.
    pub id: i64,
    /// Action category, e.g. "feedback" or "extract".
    pub action_type: String,
    /// Outcome, e.g. "success" or "error".
    pub status: String,
    /// Free-form detail message.
    pub message: String,
    /// Timestamp the action was logged.
    pub created_at: String,
}

/// Append an entry to the action log.
pub async fn log_action(
    pool: &DbPool,
    action_type: &str,
    status: &str,
    message: &str,
) -> Result<(), StorageError> {
    sqlx::query("INSERT INTO action_log (action_type, status, message) VALUES (?, ?, ?)")
        .bind(action_type)
        .bind(status)
        .bind(message)
        .execute(pool)
        .await
        .map_err(StorageError::from_sqlx)?;

    Ok(())
}

/// Most recent actions, newest first.
pub async fn recent_actions(pool: &DbPool, limit: u32) -> Result<Vec<ActionEntry>, StorageError> {
    sqlx::query_as::<_, ActionEntry>(
        "SELECT * FROM action_log ORDER BY created_at DESC, id DESC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(StorageError::from_sqlx)
}

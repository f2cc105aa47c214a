//! Key/value settings storage.
//!
//! Settings are JSON-encoded values under string keys. The preference
//! summary is the main occupant: a singleton record with its text, an
//! enabled flag, the feedback counter, and the last-update timestamp.

use super::DbPool;
use crate::error::StorageError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Settings key holding the preference summary record.
pub const PREFERENCE_SUMMARY_KEY: &str = "preference_summary";

/// The learned user-preference summary and its bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreferenceSummary {
    /// Natural-language description of what the user likes and dislikes.
    #[serde(default)]
    pub summary: String,
    /// Whether the summary is included in classification prompts.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Feedback events since the summary was last regenerated.
    #[serde(default)]
    pub updates_since_last_summary: u32,
    /// Timestamp of the last regeneration.
    #[serde(default)]
    pub last_updated_at: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl Default for PreferenceSummary {
    fn default() -> Self {
        Self {
            summary: String::new(),
            enabled: true,
            updates_since_last_summary: 0,
            last_updated_at: None,
        }
    }
}

/// Read a setting, deserializing its JSON value. Returns `None` when the
/// key is absent.
pub async fn get_setting<T: DeserializeOwned>(
    pool: &DbPool,
    key: &str,
) -> Result<Option<T>, StorageError> {
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await
        .map_err(StorageError::from_sqlx)?;

    match row {
        Some((value,)) => serde_json::from_str(&value).map(Some).map_err(|e| {
            StorageError::Query {
                source: sqlx::Error::Decode(Box::new(e)),
            }
        }),
        None => Ok(None),
    }
}

/// Write a setting, serializing the value as JSON.
pub async fn set_setting<T: Serialize + Sync>(
    pool: &DbPool,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let json = serde_json::to_string(value).map_err(|e| StorageError::Query {
        source: sqlx::Error::Encode(Box::new(e)),
    })?;

    sqlx::query(
        "INSERT INTO settings (key, value, updated_at) VALUES (?, ?, ?) \
         ON CONFLICT (key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
    )
    .bind(key)
    .bind(json)
    .bind(super::now_timestamp())
    .execute(pool)
    .await
    .map_err(StorageError::from_sqlx)?;

    Ok(())
}

/// Load the preference summary, defaulting when none has been stored yet.
pub async fn load_preference_summary(pool: &DbPool) -> Result<PreferenceSummary, StorageError> {
    Ok(get_setting(pool, PREFERENCE_SUMMARY_KEY)
        .await?
        .unwrap_or_default())
}

/// Persist the preference summary record.
pub async fn store_preference_summary(
    pool: &DbPool,
    summary: &PreferenceSummary,
) -> Result<(), StorageError> {
    set_setting(pool, PREFERENCE_SUMMARY_KEY, summary).await
}

/// Reset the preference summary to its empty default.
pub async fn reset_preference_summary(pool: &DbPool) -> Result<(), StorageError> {
    store_preference_summary(pool, &PreferenceSummary::default()).await
}

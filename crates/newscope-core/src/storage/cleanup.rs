//! Data retention cleanup for bounded database growth.
//!
//! Prunes low-scoring old items and stale action-log entries. Items with
//! explicit user feedback are never deleted, whatever their age or score.

use super::DbPool;
use crate::error::StorageError;
use chrono::Utc;
use std::time::Duration;

/// Statistics from a cleanup run.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CleanupStats {
    /// Number of items deleted.
    pub items_deleted: u64,
    /// Number of action-log entries deleted.
    pub actions_deleted: u64,
    /// Total records deleted.
    pub total_deleted: u64,
    /// Whether VACUUM was run to reclaim disk space.
    pub vacuum_run: bool,
}

/// Run a retention pass.
///
/// Deletes items whose publication time is older than `age`, whose
/// relevance score is below `min_score` (unclassified counts as zero),
/// and which carry no user feedback. Also prunes action-log entries
/// older than `action_horizon`. Runs VACUUM if more than 1000 rows were
/// deleted in total.
pub async fn run_cleanup(
    pool: &DbPool,
    age: Duration,
    min_score: f64,
    action_horizon: Duration,
) -> Result<CleanupStats, StorageError> {
    let now = Utc::now();
    let item_cutoff = super::timestamp(now - chrono::Duration::seconds(age.as_secs() as i64));
    let action_cutoff =
        super::timestamp(now - chrono::Duration::seconds(action_horizon.as_secs() as i64));

    let items_result = sqlx::query(
        "DELETE FROM items WHERE COALESCE(published, created_at) < ? \
         AND COALESCE(relevance_score, 0.0) < ? \
         AND user_feedback = 'none'",
    )
    .bind(&item_cutoff)
    .bind(min_score)
    .execute(pool)
    .await
    .map_err(StorageError::from_sqlx)?;
    let items_deleted = items_result.rows_affected();

    let actions_result = sqlx::query("DELETE FROM action_log WHERE created_at < ?")
        .bind(&action_cutoff)
        .execute(pool)
        .await
        .map_err(StorageError::from_sqlx)?;
    let actions_deleted = actions_result.rows_affected();

    let total_deleted = items_deleted + actions_deleted;

    let vacuum_run = if total_deleted > 1000 {
        sqlx::query("VACUUM")
            .execute(pool)
            .await
            .map_err(StorageError::from_sqlx)?;
        true
    } else {
        false
    };

    let stats = CleanupStats {
        items_deleted,
        actions_deleted,
        total_deleted,
        vacuum_run,
    };

    tracing::info!(
        items = stats.items_deleted,
        actions = stats.actions_deleted,
        vacuum = stats.vacuum_run,
        "Cleanup completed"
    );

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::feeds::{create_feed, NewFeed};
    use crate::storage::init_test_db;

    const DAY: Duration = Duration::from_secs(86_400);

    async fn seed_feed(pool: &DbPool) -> i64 {
        create_feed(
            pool,
            &NewFeed {
                url: "https://example.com/rss".to_string(),
                title: "Example".to_string(),
                description: String::new(),
                enabled: true,
                priority: 0,
                fetch_interval: 1800,
            },
        )
        .await
        .expect("feed")
        .id
    }

    /// Insert an item with explicit publication time, score, and feedback.
    async fn insert_item_at(
        pool: &DbPool,
        feed_id: i64,
        guid: &str,
        published: &str,
        score: Option<f64>,
        feedback: &str,
    ) {
        sqlx::query(
            "INSERT INTO items (feed_id, guid, title, published, relevance_score, \
             classified_at, user_feedback, feedback_at) \
             VALUES (?, ?, ?, ?, ?, CASE WHEN ? IS NULL THEN NULL ELSE ? END, ?, \
             CASE WHEN ? = 'none' THEN NULL ELSE ? END)",
        )
        .bind(feed_id)
        .bind(guid)
        .bind(format!("Article {guid}"))
        .bind(published)
        .bind(score)
        .bind(score)
        .bind(published)
        .bind(feedback)
        .bind(feedback)
        .bind(published)
        .execute(pool)
        .await
        .expect("insert item");
    }

    fn days_ago(days: i64) -> String {
        crate::storage::timestamp(Utc::now() - chrono::Duration::days(days))
    }

    #[tokio::test]
    async fn deletes_old_low_scoring_items_without_feedback() {
        let pool = init_test_db().await.expect("init db");
        let feed = seed_feed(&pool).await;

        insert_item_at(&pool, feed, "old_low", &days_ago(30), Some(0.5), "none").await;
        insert_item_at(&pool, feed, "old_high", &days_ago(30), Some(8.0), "none").await;
        insert_item_at(&pool, feed, "recent_low", &days_ago(1), Some(0.5), "none").await;

        let stats = run_cleanup(&pool, 7 * DAY, 5.0, 30 * DAY).await.expect("cleanup");
        assert_eq!(stats.items_deleted, 1);

        let remaining: Vec<(String,)> = sqlx::query_as("SELECT guid FROM items ORDER BY guid")
            .fetch_all(&pool)
            .await
            .expect("remaining");
        let guids: Vec<&str> = remaining.iter().map(|g| g.0.as_str()).collect();
        assert_eq!(guids, vec!["old_high", "recent_low"]);
    }

    #[tokio::test]
    async fn never_deletes_items_with_feedback() {
        let pool = init_test_db().await.expect("init db");
        let feed = seed_feed(&pool).await;

        // Twin items: identical age and score, only feedback differs.
        insert_item_at(&pool, feed, "liked", &days_ago(30), Some(0.5), "like").await;
        insert_item_at(&pool, feed, "ignored", &days_ago(30), Some(0.5), "none").await;

        let stats = run_cleanup(&pool, 7 * DAY, 5.0, 30 * DAY).await.expect("cleanup");
        assert_eq!(stats.items_deleted, 1);

        let remaining: Vec<(String,)> = sqlx::query_as("SELECT guid FROM items")
            .fetch_all(&pool)
            .await
            .expect("remaining");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].0, "liked");
    }

    #[tokio::test]
    async fn deletes_old_unclassified_items() {
        let pool = init_test_db().await.expect("init db");
        let feed = seed_feed(&pool).await;

        insert_item_at(&pool, feed, "unclassified", &days_ago(30), None, "none").await;

        let stats = run_cleanup(&pool, 7 * DAY, 5.0, 30 * DAY).await.expect("cleanup");
        assert_eq!(stats.items_deleted, 1);
    }

    #[tokio::test]
    async fn prunes_old_action_log_entries() {
        let pool = init_test_db().await.expect("init db");

        sqlx::query(
            "INSERT INTO action_log (action_type, status, message, created_at) \
             VALUES ('feedback', 'success', 'old', ?)",
        )
        .bind(days_ago(45))
        .execute(&pool)
        .await
        .expect("old action");
        crate::storage::action_log::log_action(&pool, "feedback", "success", "recent")
            .await
            .expect("recent action");

        let stats = run_cleanup(&pool, 7 * DAY, 5.0, 30 * DAY).await.expect("cleanup");
        assert_eq!(stats.actions_deleted, 1);

        let remaining = crate::storage::action_log::recent_actions(&pool, 10)
            .await
            .expect("remaining");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].message, "recent");
    }

    #[tokio::test]
    async fn empty_database_returns_zero_stats() {
        let pool = init_test_db().await.expect("init db");
        let stats = run_cleanup(&pool, 7 * DAY, 5.0, 30 * DAY).await.expect("cleanup");
        assert_eq!(stats.total_deleted, 0);
        assert!(!stats.vacuum_run);
    }
}

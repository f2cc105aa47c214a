//! CRUD operations for feeds.
//!
//! Feeds carry their own polling state: `next_fetch` drives the
//! scheduler, `etag`/`last_modified` enable conditional GETs, and
//! `error_count` feeds the exponential fetch backoff.

use super::DbPool;
use crate::error::StorageError;

/// An RSS/Atom source polled on a cadence.
#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct Feed {
    /// Database row ID.
    pub id: i64,
    /// Canonical feed URL (unique).
    pub url: String,
    /// Display title.
    pub title: String,
    /// Feed description.
    pub description: String,
    /// Whether the feed is polled (0 = no, 1 = yes).
    pub enabled: i64,
    /// Scheduling priority; higher fetches earlier.
    pub priority: i64,
    /// Seconds between successful fetches.
    pub fetch_interval: i64,
    /// Timestamp of the last successful fetch.
    pub last_fetched: Option<String>,
    /// Timestamp of the next scheduled fetch.
    pub next_fetch: String,
    /// ETag from the last response, for conditional GETs.
    pub etag: Option<String>,
    /// Last-Modified from the last response, for conditional GETs.
    pub last_modified: Option<String>,
    /// Message of the most recent fetch error, if any.
    pub last_error: Option<String>,
    /// Consecutive fetch failures since the last success.
    pub error_count: i64,
    /// Mean relevance score across this feed's classified items.
    pub avg_score: Option<f64>,
    /// Timestamp the feed was created.
    pub created_at: String,
}

/// Fields accepted when creating or updating a feed.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct NewFeed {
    /// Canonical feed URL.
    pub url: String,
    /// Display title (may be backfilled from the feed itself).
    #[serde(default)]
    pub title: String,
    /// Feed description.
    #[serde(default)]
    pub description: String,
    /// Whether the feed is polled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Scheduling priority; higher fetches earlier.
    #[serde(default)]
    pub priority: i64,
    /// Seconds between successful fetches.
    #[serde(default = "default_fetch_interval")]
    pub fetch_interval: i64,
}

fn default_enabled() -> bool {
    true
}
fn default_fetch_interval() -> i64 {
    1800
}

/// Insert a new feed. `next_fetch` defaults to the epoch so the feed is
/// picked up on the next scheduler tick.
pub async fn create_feed(pool: &DbPool, feed: &NewFeed) -> Result<Feed, StorageError> {
    let result = sqlx::query(
        "INSERT INTO feeds (url, title, description, enabled, priority, fetch_interval) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&feed.url)
    .bind(&feed.title)
    .bind(&feed.description)
    .bind(i64::from(feed.enabled))
    .bind(feed.priority)
    .bind(feed.fetch_interval)
    .execute(pool)
    .await
    .map_err(StorageError::from_sqlx)?;

    let id = result.last_insert_rowid();
    let created = get_feed(pool, id).await?.ok_or(StorageError::Query {
        source: sqlx::Error::RowNotFound,
    })?;
    Ok(created)
}

/// Fetch a single feed by ID. Returns `None` if not found.
pub async fn get_feed(pool: &DbPool, id: i64) -> Result<Option<Feed>, StorageError> {
    sqlx::query_as::<_, Feed>("SELECT * FROM feeds WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(StorageError::from_sqlx)
}

/// Fetch a single feed by its canonical URL. Returns `None` if not found.
pub async fn get_feed_by_url(pool: &DbPool, url: &str) -> Result<Option<Feed>, StorageError> {
    sqlx::query_as::<_, Feed>("SELECT * FROM feeds WHERE url = ?")
        .bind(url)
        .fetch_optional(pool)
        .await
        .map_err(StorageError::from_sqlx)
}

/// List feeds, optionally only enabled ones, highest priority first.
pub async fn list_feeds(pool: &DbPool, enabled_only: bool) -> Result<Vec<Feed>, StorageError> {
    let sql = if enabled_only {
        "SELECT * FROM feeds WHERE enabled = 1 ORDER BY priority DESC, title ASC"
    } else {
        "SELECT * FROM feeds ORDER BY priority DESC, title ASC"
    };
    sqlx::query_as::<_, Feed>(sql)
        .fetch_all(pool)
        .await
        .map_err(StorageError::from_sqlx)
}

/// Update a feed's user-editable fields. Returns false if the feed does not exist.
pub async fn update_feed(pool: &DbPool, id: i64, feed: &NewFeed) -> Result<bool, StorageError> {
    let result = sqlx::query(
        "UPDATE feeds SET url = ?, title = ?, description = ?, enabled = ?, \
         priority = ?, fetch_interval = ? WHERE id = ?",
    )
    .bind(&feed.url)
    .bind(&feed.title)
    .bind(&feed.description)
    .bind(i64::from(feed.enabled))
    .bind(feed.priority)
    .bind(feed.fetch_interval)
    .bind(id)
    .execute(pool)
    .await
    .map_err(StorageError::from_sqlx)?;

    Ok(result.rows_affected() > 0)
}

/// Delete a feed and (via FK cascade) all of its items.
pub async fn delete_feed(pool: &DbPool, id: i64) -> Result<bool, StorageError> {
    let result = sqlx::query("DELETE FROM feeds WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .map_err(StorageError::from_sqlx)?;

    Ok(result.rows_affected() > 0)
}

/// Record a successful fetch: stamps `last_fetched`/`next_fetch`, stores
/// the response validators, and clears the error state.
pub async fn update_feed_fetched(
    pool: &DbPool,
    id: i64,
    last_fetched: &str,
    next_fetch: &str,
    etag: Option<&str>,
    last_modified: Option<&str>,
) -> Result<(), StorageError> {
    sqlx::query(
        "UPDATE feeds SET last_fetched = ?, next_fetch = ?, \
         etag = COALESCE(?, etag), last_modified = COALESCE(?, last_modified), \
         last_error = NULL, error_count = 0 WHERE id = ?",
    )
    .bind(last_fetched)
    .bind(next_fetch)
    .bind(etag)
    .bind(last_modified)
    .bind(id)
    .execute(pool)
    .await
    .map_err(StorageError::from_sqlx)?;

    Ok(())
}

/// Record a failed fetch: stores the message, increments `error_count`,
/// and pushes `next_fetch` out to the caller-computed backoff.
pub async fn update_feed_error(
    pool: &DbPool,
    id: i64,
    message: &str,
    next_fetch: &str,
) -> Result<(), StorageError> {
    sqlx::query(
        "UPDATE feeds SET last_error = ?, error_count = error_count + 1, next_fetch = ? \
         WHERE id = ?",
    )
    .bind(message)
    .bind(next_fetch)
    .bind(id)
    .execute(pool)
    .await
    .map_err(StorageError::from_sqlx)?;

    Ok(())
}

/// Backfill the display title/description from the parsed feed document,
/// only when the stored values are still empty.
pub async fn backfill_feed_metadata(
    pool: &DbPool,
    id: i64,
    title: &str,
    description: &str,
) -> Result<(), StorageError> {
    sqlx::query(
        "UPDATE feeds SET \
         title = CASE WHEN title = '' THEN ? ELSE title END, \
         description = CASE WHEN description = '' THEN ? ELSE description END \
         WHERE id = ?",
    )
    .bind(title)
    .bind(description)
    .bind(id)
    .execute(pool)
    .await
    .map_err(StorageError::from_sqlx)?;

    Ok(())
}

/// Enabled feeds whose `next_fetch` has passed, highest priority first,
/// then most overdue first.
pub async fn feeds_due_for_update(
    pool: &DbPool,
    now: &str,
    limit: u32,
) -> Result<Vec<Feed>, StorageError> {
    sqlx::query_as::<_, Feed>(
        "SELECT * FROM feeds WHERE enabled = 1 AND next_fetch <= ? \
         ORDER BY priority DESC, next_fetch ASC LIMIT ?",
    )
    .bind(now)
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(StorageError::from_sqlx)
}

/// Recompute a feed's mean relevance score from its classified items.
pub async fn update_feed_avg_score(pool: &DbPool, id: i64) -> Result<(), StorageError> {
    sqlx::query(
        "UPDATE feeds SET avg_score = (SELECT AVG(relevance_score) FROM items \
         WHERE feed_id = ? AND classified_at IS NOT NULL) WHERE id = ?",
    )
    .bind(id)
    .bind(id)
    .execute(pool)
    .await
    .map_err(StorageError::from_sqlx)?;

    Ok(())
}

/// Number of feeds in the database.
pub async fn count_feeds(pool: &DbPool) -> Result<i64, StorageError> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM feeds")
        .fetch_one(pool)
        .await
        .map_err(StorageError::from_sqlx)?;
    Ok(row.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::init_test_db;

    fn sample_feed(url: &str) -> NewFeed {
        NewFeed {
            url: url.to_string(),
            title: "Example".to_string(),
            description: "An example feed".to_string(),
            enabled: true,
            priority: 0,
            fetch_interval: 1800,
        }
    }

    #[tokio::test]
    async fn create_and_get_feed() {
        let pool = init_test_db().await.expect("init db");
        let feed = create_feed(&pool, &sample_feed("https://example.com/rss"))
            .await
            .expect("create");

        assert_eq!(feed.url, "https://example.com/rss");
        assert_eq!(feed.enabled, 1);
        assert_eq!(feed.error_count, 0);

        let by_url = get_feed_by_url(&pool, "https://example.com/rss")
            .await
            .expect("get")
            .expect("exists");
        assert_eq!(by_url.id, feed.id);
    }

    #[tokio::test]
    async fn duplicate_url_is_rejected() {
        let pool = init_test_db().await.expect("init db");
        create_feed(&pool, &sample_feed("https://example.com/rss"))
            .await
            .expect("first");
        let err = create_feed(&pool, &sample_feed("https://example.com/rss"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Query { .. }));
    }

    #[tokio::test]
    async fn new_feed_is_immediately_due() {
        let pool = init_test_db().await.expect("init db");
        let feed = create_feed(&pool, &sample_feed("https://example.com/rss"))
            .await
            .expect("create");

        let due = feeds_due_for_update(&pool, "2026-01-01T00:00:00Z", 10)
            .await
            .expect("due");
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, feed.id);
    }

    #[tokio::test]
    async fn due_ordering_by_priority_then_overdue() {
        let pool = init_test_db().await.expect("init db");
        let mut low = sample_feed("https://a.example/rss");
        low.priority = 0;
        let mut high = sample_feed("https://b.example/rss");
        high.priority = 5;
        let a = create_feed(&pool, &low).await.expect("a");
        let b = create_feed(&pool, &high).await.expect("b");

        let due = feeds_due_for_update(&pool, "2026-01-01T00:00:00Z", 10)
            .await
            .expect("due");
        assert_eq!(due[0].id, b.id, "higher priority first");
        assert_eq!(due[1].id, a.id);
    }

    #[tokio::test]
    async fn fetched_clears_error_state() {
        let pool = init_test_db().await.expect("init db");
        let feed = create_feed(&pool, &sample_feed("https://example.com/rss"))
            .await
            .expect("create");

        update_feed_error(&pool, feed.id, "boom", "2026-01-01T01:00:00Z")
            .await
            .expect("error");
        let errored = get_feed(&pool, feed.id).await.expect("get").expect("exists");
        assert_eq!(errored.error_count, 1);
        assert_eq!(errored.last_error.as_deref(), Some("boom"));

        update_feed_fetched(
            &pool,
            feed.id,
            "2026-01-01T02:00:00Z",
            "2026-01-01T02:30:00Z",
            Some("\"etag-1\""),
            None,
        )
        .await
        .expect("fetched");

        let fetched = get_feed(&pool, feed.id).await.expect("get").expect("exists");
        assert_eq!(fetched.error_count, 0);
        assert!(fetched.last_error.is_none());
        assert_eq!(fetched.etag.as_deref(), Some("\"etag-1\""));
        assert_eq!(fetched.next_fetch, "2026-01-01T02:30:00Z");
    }

    #[tokio::test]
    async fn disabled_feed_is_not_due() {
        let pool = init_test_db().await.expect("init db");
        let mut feed = sample_feed("https://example.com/rss");
        feed.enabled = false;
        create_feed(&pool, &feed).await.expect("create");

        let due = feeds_due_for_update(&pool, "2026-01-01T00:00:00Z", 10)
            .await
            .expect("due");
        assert!(due.is_empty());
    }

    #[tokio::test]
    async fn backfill_only_fills_empty_fields() {
        let pool = init_test_db().await.expect("init db");
        let mut feed = sample_feed("https://example.com/rss");
        feed.title = String::new();
        let created = create_feed(&pool, &feed).await.expect("create");

        backfill_feed_metadata(&pool, created.id, "Parsed Title", "Parsed description")
            .await
            .expect("backfill");
        let updated = get_feed(&pool, created.id).await.expect("get").expect("exists");
        assert_eq!(updated.title, "Parsed Title");
        // Description was already set, so it is preserved.
        assert_eq!(updated.description, "An example feed");
    }

    #[tokio::test]
    async fn delete_feed_removes_row() {
        let pool = init_test_db().await.expect("init db");
        let feed = create_feed(&pool, &sample_feed("https://example.com/rss"))
            .await
            .expect("create");

        assert!(delete_feed(&pool, feed.id).await.expect("delete"));
        assert!(get_feed(&pool, feed.id).await.expect("get").is_none());
        assert!(!delete_feed(&pool, feed.id).await.expect("second delete"));
    }
}

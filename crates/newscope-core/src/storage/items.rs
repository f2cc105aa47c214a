//! CRUD operations for items.
//!
//! An item is one article belonging to a feed, identified within that
//! feed by its publisher-provided GUID. Ingestion is idempotent on
//! `(feed_id, guid)`; the extraction and classification stages claim work
//! through the two `list_items_needing_*` queues and report completion
//! with single-row atomic updates.

use super::DbPool;
use crate::error::StorageError;

/// User feedback recorded on an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feedback {
    /// No feedback (the default, also used to unset).
    None,
    /// The user liked the article.
    Like,
    /// The user disliked the article.
    Dislike,
}

impl Feedback {
    /// Canonical string stored in the `user_feedback` column.
    pub fn as_str(self) -> &'static str {
        match self {
            Feedback::None => "none",
            Feedback::Like => "like",
            Feedback::Dislike => "dislike",
        }
    }

    /// Parse a feedback action string; `unset` is an alias for `none`.
    pub fn parse(s: &str) -> Option<Feedback> {
        match s {
            "like" => Some(Feedback::Like),
            "dislike" => Some(Feedback::Dislike),
            "none" | "unset" => Some(Feedback::None),
            _ => None,
        }
    }
}

/// One article belonging to a feed.
#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct Item {
    /// Database row ID.
    pub id: i64,
    /// Owning feed.
    pub feed_id: i64,
    /// Publisher-provided GUID, unique within the feed.
    pub guid: String,
    /// Article title.
    pub title: String,
    /// Article link.
    pub link: String,
    /// Original description from the feed (overwritten by the summary
    /// once classified).
    pub description: String,
    /// Original full content from the feed, if the feed carries one.
    pub content: String,
    /// Article author.
    pub author: String,
    /// Publication timestamp.
    pub published: Option<String>,
    /// Extracted plain text, when extraction succeeded.
    pub extracted_content: Option<String>,
    /// Extracted clean HTML, when extraction succeeded.
    pub extracted_rich_content: Option<String>,
    /// Timestamp extraction was attempted (success or failure).
    pub extracted_at: Option<String>,
    /// Extraction failure message, if extraction failed.
    pub extraction_error: Option<String>,
    /// LLM relevance score in [0, 10].
    pub relevance_score: Option<f64>,
    /// Short explanation of the score.
    pub explanation: Option<String>,
    /// JSON-encoded array of topic tags.
    pub topics: Option<String>,
    /// LLM-generated summary.
    pub summary: Option<String>,
    /// Timestamp the item was classified.
    pub classified_at: Option<String>,
    /// User feedback state ('none', 'like', 'dislike').
    pub user_feedback: String,
    /// Timestamp feedback was last set.
    pub feedback_at: Option<String>,
    /// Timestamp the item was first ingested.
    pub created_at: String,
}

impl Item {
    /// Decode the JSON `topics` column into a tag list.
    pub fn topic_list(&self) -> Vec<String> {
        self.topics
            .as_deref()
            .and_then(|t| serde_json::from_str(t).ok())
            .unwrap_or_default()
    }
}

/// A prospective item produced by feed parsing, before persistence.
#[derive(Debug, Clone)]
pub struct NewItem {
    /// Owning feed.
    pub feed_id: i64,
    /// Publisher-provided or derived GUID.
    pub guid: String,
    /// Article title.
    pub title: String,
    /// Article link.
    pub link: String,
    /// Description from the feed.
    pub description: String,
    /// Full content from the feed, if present.
    pub content: String,
    /// Article author.
    pub author: String,
    /// Publication timestamp.
    pub published: Option<String>,
}

/// Extraction and classification fields written together by
/// [`update_item_processed`].
#[derive(Debug, Clone, Default)]
pub struct ProcessedFields {
    /// Extracted plain text carried along with the classification, if any.
    pub extracted_content: Option<String>,
    /// Extracted clean HTML carried along with the classification, if any.
    pub extracted_rich_content: Option<String>,
    /// Relevance score, already clamped into [0, 10].
    pub relevance_score: f64,
    /// Short explanation of the score.
    pub explanation: String,
    /// Topic tags (possibly empty, never absent once classified).
    pub topics: Vec<String>,
    /// Generated summary; when non-empty it replaces the description.
    pub summary: String,
}

/// Insert an item if its `(feed_id, guid)` pair is new.
///
/// Returns true when this call performed the insert, false when the item
/// already existed (repeated ingestion is a no-op).
pub async fn upsert_item(pool: &DbPool, item: &NewItem) -> Result<bool, StorageError> {
    let result = sqlx::query(
        "INSERT INTO items (feed_id, guid, title, link, description, content, author, published) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT (feed_id, guid) DO NOTHING",
    )
    .bind(item.feed_id)
    .bind(&item.guid)
    .bind(&item.title)
    .bind(&item.link)
    .bind(&item.description)
    .bind(&item.content)
    .bind(&item.author)
    .bind(&item.published)
    .execute(pool)
    .await
    .map_err(StorageError::from_sqlx)?;

    Ok(result.rows_affected() > 0)
}

/// Insert a batch of items in a single transaction.
///
/// Any failure rolls back the whole batch. Returns the number of items
/// actually inserted (duplicates are skipped, not errors).
pub async fn bulk_upsert_items(pool: &DbPool, items: &[NewItem]) -> Result<u64, StorageError> {
    let mut tx = pool.begin().await.map_err(StorageError::from_sqlx)?;
    let mut inserted = 0u64;

    for item in items {
        let result = sqlx::query(
            "INSERT INTO items (feed_id, guid, title, link, description, content, author, published) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (feed_id, guid) DO NOTHING",
        )
        .bind(item.feed_id)
        .bind(&item.guid)
        .bind(&item.title)
        .bind(&item.link)
        .bind(&item.description)
        .bind(&item.content)
        .bind(&item.author)
        .bind(&item.published)
        .execute(&mut *tx)
        .await
        .map_err(StorageError::from_sqlx)?;
        inserted += result.rows_affected();
    }

    tx.commit().await.map_err(StorageError::from_sqlx)?;
    Ok(inserted)
}

/// Fetch a single item by ID. Returns `None` if not found.
pub async fn get_item(pool: &DbPool, id: i64) -> Result<Option<Item>, StorageError> {
    sqlx::query_as::<_, Item>("SELECT * FROM items WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(StorageError::from_sqlx)
}

/// Items that still need a full-text extraction attempt, oldest first.
pub async fn list_items_needing_extraction(
    pool: &DbPool,
    limit: u32,
) -> Result<Vec<Item>, StorageError> {
    sqlx::query_as::<_, Item>(
        "SELECT * FROM items \
         WHERE extracted_at IS NULL AND extraction_error IS NULL \
         ORDER BY COALESCE(published, created_at) ASC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(StorageError::from_sqlx)
}

/// Items eligible for classification, oldest first.
///
/// When `require_extraction` is true (extraction enabled), an item
/// becomes eligible once extraction was attempted; items with a
/// persistent extraction error are still classified from their feed
/// fields. When false, every unclassified item is eligible.
pub async fn list_items_needing_classification(
    pool: &DbPool,
    require_extraction: bool,
    limit: u32,
) -> Result<Vec<Item>, StorageError> {
    let sql = if require_extraction {
        "SELECT * FROM items \
         WHERE classified_at IS NULL AND extracted_at IS NOT NULL \
         ORDER BY COALESCE(published, created_at) ASC LIMIT ?"
    } else {
        "SELECT * FROM items \
         WHERE classified_at IS NULL \
         ORDER BY COALESCE(published, created_at) ASC LIMIT ?"
    };
    sqlx::query_as::<_, Item>(sql)
        .bind(limit)
        .fetch_all(pool)
        .await
        .map_err(StorageError::from_sqlx)
}

/// Record an extraction attempt, success or failure.
///
/// Stamps `extracted_at` either way so the item leaves the extraction
/// queue; failed items are not retried automatically.
pub async fn update_item_extraction(
    pool: &DbPool,
    id: i64,
    content: &str,
    rich_content: &str,
    error: Option<&str>,
) -> Result<(), StorageError> {
    sqlx::query(
        "UPDATE items SET extracted_content = ?, extracted_rich_content = ?, \
         extracted_at = ?, extraction_error = ? WHERE id = ?",
    )
    .bind(content)
    .bind(rich_content)
    .bind(super::now_timestamp())
    .bind(error)
    .bind(id)
    .execute(pool)
    .await
    .map_err(StorageError::from_sqlx)?;

    Ok(())
}

/// Clear a previous extraction attempt so the item re-enters the
/// extraction queue (used by the on-demand extraction endpoint).
pub async fn reset_item_extraction(pool: &DbPool, id: i64) -> Result<bool, StorageError> {
    let result = sqlx::query(
        "UPDATE items SET extracted_at = NULL, extraction_error = NULL WHERE id = ?",
    )
    .bind(id)
    .execute(pool)
    .await
    .map_err(StorageError::from_sqlx)?;

    Ok(result.rows_affected() > 0)
}

/// Atomically write extraction and classification fields for one item.
///
/// A single-row UPDATE, so the write is transactional by itself: score,
/// explanation, topics, summary, and `classified_at` land together, and
/// a non-empty summary replaces the feed description. Repeating the call
/// is last-writer-wins with `classified_at` bumping.
pub async fn update_item_processed(
    pool: &DbPool,
    id: i64,
    fields: &ProcessedFields,
) -> Result<(), StorageError> {
    let topics = serde_json::to_string(&fields.topics).unwrap_or_else(|_| "[]".to_string());

    sqlx::query(
        "UPDATE items SET \
         extracted_content = COALESCE(?, extracted_content), \
         extracted_rich_content = COALESCE(?, extracted_rich_content), \
         extracted_at = CASE WHEN ? IS NOT NULL AND extracted_at IS NULL THEN ? \
                        ELSE extracted_at END, \
         relevance_score = ?, explanation = ?, topics = ?, summary = ?, \
         classified_at = ?, \
         description = CASE WHEN ? != '' THEN ? ELSE description END \
         WHERE id = ?",
    )
    .bind(&fields.extracted_content)
    .bind(&fields.extracted_rich_content)
    .bind(&fields.extracted_content)
    .bind(super::now_timestamp())
    .bind(fields.relevance_score)
    .bind(&fields.explanation)
    .bind(topics)
    .bind(&fields.summary)
    .bind(super::now_timestamp())
    .bind(&fields.summary)
    .bind(&fields.summary)
    .bind(id)
    .execute(pool)
    .await
    .map_err(StorageError::from_sqlx)?;

    Ok(())
}

/// Set (or unset) user feedback on an item. Returns false if the item
/// does not exist.
pub async fn set_item_feedback(
    pool: &DbPool,
    id: i64,
    feedback: Feedback,
) -> Result<bool, StorageError> {
    let feedback_at = match feedback {
        Feedback::None => None,
        _ => Some(super::now_timestamp()),
    };

    let result = sqlx::query("UPDATE items SET user_feedback = ?, feedback_at = ? WHERE id = ?")
        .bind(feedback.as_str())
        .bind(feedback_at)
        .bind(id)
        .execute(pool)
        .await
        .map_err(StorageError::from_sqlx)?;

    Ok(result.rows_affected() > 0)
}

/// Total number of items in the database.
pub async fn count_items(pool: &DbPool) -> Result<i64, StorageError> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM items")
        .fetch_one(pool)
        .await
        .map_err(StorageError::from_sqlx)?;
    Ok(row.0)
}

/// Number of classified items in the database.
pub async fn count_classified(pool: &DbPool) -> Result<i64, StorageError> {
    let row: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM items WHERE classified_at IS NOT NULL")
            .fetch_one(pool)
            .await
            .map_err(StorageError::from_sqlx)?;
    Ok(row.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::feeds::{create_feed, NewFeed};
    use crate::storage::init_test_db;

    async fn test_feed(pool: &DbPool) -> i64 {
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
        .expect("create feed")
        .id
    }

    fn sample_item(feed_id: i64, guid: &str) -> NewItem {
        NewItem {
            feed_id,
            guid: guid.to_string(),
            title: format!("Article {guid}"),
            link: format!("https://example.com/{guid}"),
            description: "A description".to_string(),
            content: String::new(),
            author: "alice".to_string(),
            published: Some("2026-01-01T00:00:00Z".to_string()),
        }
    }

    #[tokio::test]
    async fn upsert_is_idempotent() {
        let pool = init_test_db().await.expect("init db");
        let feed_id = test_feed(&pool).await;
        let item = sample_item(feed_id, "g1");

        assert!(upsert_item(&pool, &item).await.expect("first"));
        assert!(!upsert_item(&pool, &item).await.expect("second"));
        assert_eq!(count_items(&pool).await.expect("count"), 1);
    }

    #[tokio::test]
    async fn dedup_across_two_polls() {
        let pool = init_test_db().await.expect("init db");
        let feed_id = test_feed(&pool).await;

        // First poll serves g1 and g2; second poll serves g2 and g3.
        let first = vec![sample_item(feed_id, "g1"), sample_item(feed_id, "g2")];
        let second = vec![sample_item(feed_id, "g2"), sample_item(feed_id, "g3")];

        assert_eq!(bulk_upsert_items(&pool, &first).await.expect("poll 1"), 2);
        assert_eq!(bulk_upsert_items(&pool, &second).await.expect("poll 2"), 1);
        assert_eq!(count_items(&pool).await.expect("count"), 3);

        let guids: Vec<(String,)> =
            sqlx::query_as("SELECT guid FROM items ORDER BY guid")
                .fetch_all(&pool)
                .await
                .expect("guids");
        let guids: Vec<&str> = guids.iter().map(|g| g.0.as_str()).collect();
        assert_eq!(guids, vec!["g1", "g2", "g3"]);
    }

    #[tokio::test]
    async fn bulk_upsert_twice_equals_once() {
        let pool = init_test_db().await.expect("init db");
        let feed_id = test_feed(&pool).await;
        let batch = vec![sample_item(feed_id, "a"), sample_item(feed_id, "b")];

        bulk_upsert_items(&pool, &batch).await.expect("first");
        bulk_upsert_items(&pool, &batch).await.expect("second");
        assert_eq!(count_items(&pool).await.expect("count"), 2);
    }

    #[tokio::test]
    async fn same_guid_different_feeds_are_distinct() {
        let pool = init_test_db().await.expect("init db");
        let feed_a = test_feed(&pool).await;
        let feed_b = create_feed(
            &pool,
            &NewFeed {
                url: "https://other.example/rss".to_string(),
                title: String::new(),
                description: String::new(),
                enabled: true,
                priority: 0,
                fetch_interval: 1800,
            },
        )
        .await
        .expect("feed b")
        .id;

        assert!(upsert_item(&pool, &sample_item(feed_a, "g1")).await.expect("a"));
        assert!(upsert_item(&pool, &sample_item(feed_b, "g1")).await.expect("b"));
        assert_eq!(count_items(&pool).await.expect("count"), 2);
    }

    #[tokio::test]
    async fn extraction_queue_excludes_attempted_items() {
        let pool = init_test_db().await.expect("init db");
        let feed_id = test_feed(&pool).await;
        upsert_item(&pool, &sample_item(feed_id, "g1")).await.expect("g1");
        upsert_item(&pool, &sample_item(feed_id, "g2")).await.expect("g2");

        let pending = list_items_needing_extraction(&pool, 10).await.expect("list");
        assert_eq!(pending.len(), 2);

        update_item_extraction(&pool, pending[0].id, "long text", "<p>long text</p>", None)
            .await
            .expect("extract ok");
        update_item_extraction(&pool, pending[1].id, "", "", Some("content too short"))
            .await
            .expect("extract err");

        let pending = list_items_needing_extraction(&pool, 10).await.expect("list");
        assert!(pending.is_empty(), "both attempts leave the queue");
    }

    #[tokio::test]
    async fn classification_queue_requires_extraction_attempt() {
        let pool = init_test_db().await.expect("init db");
        let feed_id = test_feed(&pool).await;
        upsert_item(&pool, &sample_item(feed_id, "g1")).await.expect("g1");
        upsert_item(&pool, &sample_item(feed_id, "g2")).await.expect("g2");

        // With extraction required, nothing is eligible yet.
        let eligible = list_items_needing_classification(&pool, true, 10)
            .await
            .expect("list");
        assert!(eligible.is_empty());

        // With extraction disabled, everything unclassified is eligible.
        let eligible = list_items_needing_classification(&pool, false, 10)
            .await
            .expect("list");
        assert_eq!(eligible.len(), 2);

        // A failed extraction still makes the item classification-eligible.
        let items = list_items_needing_extraction(&pool, 10).await.expect("pending");
        update_item_extraction(&pool, items[0].id, "", "", Some("timeout"))
            .await
            .expect("extract err");
        let eligible = list_items_needing_classification(&pool, true, 10)
            .await
            .expect("list");
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].id, items[0].id);
    }

    #[tokio::test]
    async fn processed_write_is_atomic_and_overwrites_description() {
        let pool = init_test_db().await.expect("init db");
        let feed_id = test_feed(&pool).await;
        upsert_item(&pool, &sample_item(feed_id, "g1")).await.expect("g1");
        let item = list_items_needing_extraction(&pool, 1).await.expect("list")[0].clone();

        update_item_processed(
            &pool,
            item.id,
            &ProcessedFields {
                extracted_content: Some("plain text".to_string()),
                extracted_rich_content: Some("<p>plain text</p>".to_string()),
                relevance_score: 7.5,
                explanation: "matches preferred topics".to_string(),
                topics: vec!["rust".to_string(), "databases".to_string()],
                summary: "Rust 1.99 ships faster SQLite bindings.".to_string(),
            },
        )
        .await
        .expect("processed");

        let updated = get_item(&pool, item.id).await.expect("get").expect("exists");
        assert_eq!(updated.relevance_score, Some(7.5));
        assert!(updated.classified_at.is_some());
        assert!(updated.extracted_at.is_some());
        assert_eq!(updated.topic_list(), vec!["rust", "databases"]);
        assert_eq!(updated.description, "Rust 1.99 ships faster SQLite bindings.");
        assert_eq!(updated.extracted_content.as_deref(), Some("plain text"));
    }

    #[tokio::test]
    async fn empty_summary_preserves_description() {
        let pool = init_test_db().await.expect("init db");
        let feed_id = test_feed(&pool).await;
        upsert_item(&pool, &sample_item(feed_id, "g1")).await.expect("g1");
        let item = list_items_needing_extraction(&pool, 1).await.expect("list")[0].clone();

        update_item_processed(
            &pool,
            item.id,
            &ProcessedFields {
                relevance_score: 2.0,
                topics: vec!["misc".to_string()],
                ..ProcessedFields::default()
            },
        )
        .await
        .expect("processed");

        let updated = get_item(&pool, item.id).await.expect("get").expect("exists");
        assert_eq!(updated.description, "A description");
    }

    #[tokio::test]
    async fn feedback_transitions_overwrite_and_unset() {
        let pool = init_test_db().await.expect("init db");
        let feed_id = test_feed(&pool).await;
        upsert_item(&pool, &sample_item(feed_id, "g1")).await.expect("g1");
        let id = get_item_id(&pool).await;

        assert!(set_item_feedback(&pool, id, Feedback::Like).await.expect("like"));
        let item = get_item(&pool, id).await.expect("get").expect("exists");
        assert_eq!(item.user_feedback, "like");
        assert!(item.feedback_at.is_some());

        assert!(set_item_feedback(&pool, id, Feedback::Dislike).await.expect("dislike"));
        let item = get_item(&pool, id).await.expect("get").expect("exists");
        assert_eq!(item.user_feedback, "dislike");

        assert!(set_item_feedback(&pool, id, Feedback::None).await.expect("unset"));
        let item = get_item(&pool, id).await.expect("get").expect("exists");
        assert_eq!(item.user_feedback, "none");
        assert!(item.feedback_at.is_none());
    }

    #[tokio::test]
    async fn feedback_on_missing_item_returns_false() {
        let pool = init_test_db().await.expect("init db");
        assert!(!set_item_feedback(&pool, 999, Feedback::Like).await.expect("missing"));
    }

    #[tokio::test]
    async fn reset_extraction_requeues_item() {
        let pool = init_test_db().await.expect("init db");
        let feed_id = test_feed(&pool).await;
        upsert_item(&pool, &sample_item(feed_id, "g1")).await.expect("g1");
        let id = get_item_id(&pool).await;

        update_item_extraction(&pool, id, "", "", Some("paywalled"))
            .await
            .expect("extract err");
        assert!(list_items_needing_extraction(&pool, 10).await.expect("list").is_empty());

        assert!(reset_item_extraction(&pool, id).await.expect("reset"));
        let pending = list_items_needing_extraction(&pool, 10).await.expect("list");
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn feedback_parse_accepts_unset_alias() {
        assert_eq!(Feedback::parse("like"), Some(Feedback::Like));
        assert_eq!(Feedback::parse("dislike"), Some(Feedback::Dislike));
        assert_eq!(Feedback::parse("unset"), Some(Feedback::None));
        assert_eq!(Feedback::parse("none"), Some(Feedback::None));
        assert_eq!(Feedback::parse("love"), None);
    }

    async fn get_item_id(pool: &DbPool) -> i64 {
        let row: (i64,) = sqlx::query_as("SELECT id FROM items LIMIT 1")
            .fetch_one(pool)
            .await
            .expect("item id");
        row.0
    }
}

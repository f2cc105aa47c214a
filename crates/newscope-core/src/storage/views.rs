//! Read-side projections consumed by the HTTP layer.
//!
//! Classified-item listings with filtering and pagination, full-text
//! search over the FTS index, the distinct topic set, and recent
//! feedback examples used as LLM context.

use super::items::Feedback;
use super::DbPool;
use crate::error::StorageError;
use sqlx::QueryBuilder;

/// Sort orders for classified-item listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortBy {
    /// Newest published first.
    #[default]
    Published,
    /// Highest relevance score first.
    Score,
    /// Grouped by feed title.
    Source,
}

impl SortBy {
    /// Parse a sort-order name; unknown names return `None`.
    pub fn parse(s: &str) -> Option<SortBy> {
        match s {
            "published" => Some(SortBy::Published),
            "score" => Some(SortBy::Score),
            "source" => Some(SortBy::Source),
            _ => None,
        }
    }
}

/// Filter for classified-item listings.
#[derive(Debug, Clone)]
pub struct ItemFilter {
    /// Minimum relevance score (inclusive).
    pub min_score: f64,
    /// Only items tagged with this topic.
    pub topic: Option<String>,
    /// Only items from the feed with this title.
    pub feed_name: Option<String>,
    /// Sort order.
    pub sort_by: SortBy,
    /// Only items the user liked.
    pub only_liked: bool,
    /// Page size.
    pub limit: u32,
    /// Page offset.
    pub offset: u32,
}

impl Default for ItemFilter {
    fn default() -> Self {
        Self {
            min_score: 0.0,
            topic: None,
            feed_name: None,
            sort_by: SortBy::Published,
            only_liked: false,
            limit: 30,
            offset: 0,
        }
    }
}

/// A classified item joined with its feed title.
#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct ClassifiedItem {
    /// Item row ID.
    pub id: i64,
    /// Owning feed.
    pub feed_id: i64,
    /// Title of the owning feed.
    pub feed_title: String,
    /// Article title.
    pub title: String,
    /// Article link.
    pub link: String,
    /// Description (the summary once classified).
    pub description: String,
    /// Publication timestamp.
    pub published: Option<String>,
    /// Relevance score in [0, 10].
    pub relevance_score: f64,
    /// Short explanation of the score.
    pub explanation: Option<String>,
    /// JSON-encoded topic tags.
    pub topics: Option<String>,
    /// Generated summary.
    pub summary: Option<String>,
    /// Timestamp the item was classified.
    pub classified_at: String,
    /// User feedback state.
    pub user_feedback: String,
}

impl ClassifiedItem {
    /// Decode the JSON `topics` column into a tag list.
    pub fn topic_list(&self) -> Vec<String> {
        self.topics
            .as_deref()
            .and_then(|t| serde_json::from_str(t).ok())
            .unwrap_or_default()
    }
}

/// A feedback example used as LLM context.
#[derive(Debug, Clone)]
pub struct FeedbackExample {
    /// Article title.
    pub title: String,
    /// Article description.
    pub description: String,
    /// Prefix of the article content.
    pub content_prefix: String,
    /// Which feedback the user gave.
    pub feedback: Feedback,
    /// Topic tags on the article, if classified.
    pub topics: Vec<String>,
}

/// List classified items matching the filter, feed title joined.
pub async fn list_classified(
    pool: &DbPool,
    filter: &ItemFilter,
) -> Result<Vec<ClassifiedItem>, StorageError> {
    let mut qb: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
        "SELECT items.id, items.feed_id, feeds.title AS feed_title, items.title, items.link, \
         items.description, items.published, items.relevance_score, items.explanation, \
         items.topics, items.summary, items.classified_at, items.user_feedback \
         FROM items JOIN feeds ON feeds.id = items.feed_id \
         WHERE items.classified_at IS NOT NULL AND items.relevance_score >= ",
    );
    qb.push_bind(filter.min_score);

    if let Some(topic) = &filter.topic {
        qb.push(
            " AND EXISTS (SELECT 1 FROM json_each(items.topics) WHERE json_each.value = ",
        );
        qb.push_bind(topic);
        qb.push(")");
    }
    if let Some(feed_name) = &filter.feed_name {
        qb.push(" AND feeds.title = ");
        qb.push_bind(feed_name);
    }
    if filter.only_liked {
        qb.push(" AND items.user_feedback = 'like'");
    }

    qb.push(match filter.sort_by {
        SortBy::Published => " ORDER BY items.published DESC",
        SortBy::Score => " ORDER BY items.relevance_score DESC, items.published DESC",
        SortBy::Source => " ORDER BY feeds.title ASC, items.published DESC",
    });

    qb.push(" LIMIT ");
    qb.push_bind(filter.limit);
    qb.push(" OFFSET ");
    qb.push_bind(filter.offset);

    qb.build_query_as::<ClassifiedItem>()
        .fetch_all(pool)
        .await
        .map_err(StorageError::from_sqlx)
}

/// Guard a user-supplied MATCH query against pathological patterns
/// before it reaches the FTS engine.
///
/// Limits: 256 characters, 3 wildcards, 5 OR operators, 5 parentheses,
/// balanced double quotes.
pub fn validate_match_query(query: &str) -> Result<(), String> {
    if query.len() > 256 {
        return Err("search query exceeds maximum length of 256 characters".to_string());
    }
    if query.matches('*').count() > 3 {
        return Err("search query contains too many wildcards (max 3)".to_string());
    }
    if query.to_uppercase().matches(" OR ").count() > 5 {
        return Err("search query contains too many OR operators (max 5)".to_string());
    }
    let open = query.chars().filter(|&c| c == '(').count();
    let close = query.chars().filter(|&c| c == ')').count();
    if open > 5 || close > 5 {
        return Err("search query contains too many parentheses (max 5)".to_string());
    }
    if query.matches('"').count() % 2 != 0 {
        return Err("search query has unbalanced quotes".to_string());
    }
    Ok(())
}

/// Full-text search over classified items, best match first.
///
/// Matches `query` against the FTS index (title, summary, extracted
/// content) and applies the same score/topic/feed/liked filters and
/// pagination as [`list_classified`]; the filter's sort order is
/// superseded by match relevance.
pub async fn search_classified(
    pool: &DbPool,
    query: &str,
    filter: &ItemFilter,
) -> Result<Vec<ClassifiedItem>, StorageError> {
    let mut qb: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
        "SELECT items.id, items.feed_id, feeds.title AS feed_title, items.title, items.link, \
         items.description, items.published, items.relevance_score, items.explanation, \
         items.topics, items.summary, items.classified_at, items.user_feedback \
         FROM items_fts \
         JOIN items ON items.id = items_fts.rowid \
         JOIN feeds ON feeds.id = items.feed_id \
         WHERE items_fts MATCH ",
    );
    qb.push_bind(query);
    qb.push(" AND items.classified_at IS NOT NULL AND items.relevance_score >= ");
    qb.push_bind(filter.min_score);

    if let Some(topic) = &filter.topic {
        qb.push(
            " AND EXISTS (SELECT 1 FROM json_each(items.topics) WHERE json_each.value = ",
        );
        qb.push_bind(topic);
        qb.push(")");
    }
    if let Some(feed_name) = &filter.feed_name {
        qb.push(" AND feeds.title = ");
        qb.push_bind(feed_name);
    }
    if filter.only_liked {
        qb.push(" AND items.user_feedback = 'like'");
    }

    qb.push(" ORDER BY rank LIMIT ");
    qb.push_bind(filter.limit);
    qb.push(" OFFSET ");
    qb.push_bind(filter.offset);

    qb.build_query_as::<ClassifiedItem>()
        .fetch_all(pool)
        .await
        .map_err(StorageError::from_sqlx)
}

/// The distinct set of topic tags across classified items, sorted.
pub async fn distinct_topics(pool: &DbPool) -> Result<Vec<String>, StorageError> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT DISTINCT json_each.value FROM items, json_each(items.topics) \
         WHERE items.classified_at IS NOT NULL ORDER BY 1",
    )
    .fetch_all(pool)
    .await
    .map_err(StorageError::from_sqlx)?;

    Ok(rows.into_iter().map(|r| r.0).collect())
}

#[derive(sqlx::FromRow)]
struct FeedbackRow {
    title: String,
    description: String,
    content: String,
    extracted_content: Option<String>,
    user_feedback: String,
    topics: Option<String>,
}

/// Most recent feedback examples, newest first, optionally one kind only.
pub async fn recent_feedback(
    pool: &DbPool,
    kind: Option<Feedback>,
    limit: u32,
) -> Result<Vec<FeedbackExample>, StorageError> {
    let mut qb: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
        "SELECT title, description, content, extracted_content, user_feedback, topics \
         FROM items WHERE user_feedback != 'none'",
    );
    if let Some(kind) = kind {
        qb.push(" AND user_feedback = ");
        qb.push_bind(kind.as_str());
    }
    qb.push(" ORDER BY feedback_at DESC LIMIT ");
    qb.push_bind(limit);

    let rows: Vec<FeedbackRow> = qb
        .build_query_as::<FeedbackRow>()
        .fetch_all(pool)
        .await
        .map_err(StorageError::from_sqlx)?;

    Ok(rows
        .into_iter()
        .map(|r| {
            let body = match r.extracted_content {
                Some(ref c) if !c.is_empty() => c.as_str(),
                _ => r.content.as_str(),
            };
            FeedbackExample {
                title: r.title,
                description: r.description,
                content_prefix: body.chars().take(300).collect(),
                feedback: Feedback::parse(&r.user_feedback).unwrap_or(Feedback::None),
                topics: r
                    .topics
                    .as_deref()
                    .and_then(|t| serde_json::from_str(t).ok())
                    .unwrap_or_default(),
            }
        })
        .collect())
}

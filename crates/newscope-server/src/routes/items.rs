//! Classified-item listing endpoints.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use newscope_core::storage::views::{self, ItemFilter, SortBy};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

/// Query parameters for GET /api/v1/items.
#[derive(Deserialize)]
pub struct ItemsQuery {
    #[serde(default)]
    pub min_score: f64,
    pub topic: Option<String>,
    pub feed: Option<String>,
    pub sort: Option<String>,
    /// Full-text search over title, summary, and extracted content.
    /// Results come back in match-relevance order, superseding `sort`.
    pub q: Option<String>,
    #[serde(default)]
    pub liked: bool,
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: u32,
}

/// One classified item as returned by the JSON API.
#[derive(Serialize)]
pub struct ItemDto {
    pub id: i64,
    pub feed_title: String,
    pub title: String,
    pub link: String,
    pub description: String,
    pub summary: Option<String>,
    pub topics: Vec<String>,
    pub relevance_score: f64,
    pub explanation: Option<String>,
    pub published: Option<String>,
    pub classified_at: String,
    pub user_feedback: String,
}

/// GET /api/v1/items
pub async fn list_items(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ItemsQuery>,
) -> Result<Json<Vec<ItemDto>>, ApiError> {
    let sort_by = match query.sort.as_deref() {
        None => SortBy::Published,
        Some(name) => SortBy::parse(name).ok_or_else(|| {
            ApiError::BadRequest(format!(
                "unknown sort order '{name}' (use published, score, or source)"
            ))
        })?,
    };

    let filter = ItemFilter {
        min_score: query.min_score,
        topic: query.topic,
        feed_name: query.feed,
        sort_by,
        only_liked: query.liked,
        limit: query.limit.unwrap_or(state.config.server.page_size),
        offset: query.offset,
    };

    let search = query.q.as_deref().map(str::trim).filter(|q| !q.is_empty());
    let rows = match search {
        Some(q) => {
            views::validate_match_query(q).map_err(ApiError::BadRequest)?;
            views::search_classified(&state.db, q, &filter).await?
        }
        None => views::list_classified(&state.db, &filter).await?,
    };
    let items = rows
        .into_iter()
        .map(|row| {
            let topics = row.topic_list();
            ItemDto {
                id: row.id,
                feed_title: row.feed_title,
                title: row.title,
                link: row.link,
                description: row.description,
                summary: row.summary,
                topics,
                relevance_score: row.relevance_score,
                explanation: row.explanation,
                published: row.published,
                classified_at: row.classified_at,
                user_feedback: row.user_feedback,
            }
        })
        .collect();

    Ok(Json(items))
}

/// GET /api/v1/topics
pub async fn list_topics(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(views::distinct_topics(&state.db).await?))
}

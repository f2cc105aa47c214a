//! Feed management endpoints.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use newscope_core::error::StorageError;
use newscope_core::retry::retry;
use newscope_core::storage::feeds::{self, Feed, NewFeed};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

/// Query parameters for GET /api/v1/feeds.
#[derive(Deserialize)]
pub struct FeedsQuery {
    #[serde(default)]
    pub enabled: bool,
}

/// One feed as returned by the JSON API.
#[derive(Serialize)]
pub struct FeedDto {
    pub id: i64,
    pub url: String,
    pub title: String,
    pub description: String,
    pub enabled: bool,
    pub priority: i64,
    pub fetch_interval: i64,
    pub last_fetched: Option<String>,
    pub next_fetch: String,
    pub last_error: Option<String>,
    pub error_count: i64,
    pub avg_score: Option<f64>,
}

impl From<Feed> for FeedDto {
    fn from(feed: Feed) -> Self {
        Self {
            id: feed.id,
            url: feed.url,
            title: feed.title,
            description: feed.description,
            enabled: feed.enabled != 0,
            priority: feed.priority,
            fetch_interval: feed.fetch_interval,
            last_fetched: feed.last_fetched,
            next_fetch: feed.next_fetch,
            last_error: feed.last_error,
            error_count: feed.error_count,
            avg_score: feed.avg_score,
        }
    }
}

fn validate_feed(feed: &NewFeed) -> Result<(), ApiError> {
    if feed.url.is_empty() {
        return Err(ApiError::BadRequest("feed url is required".to_string()));
    }
    let parsed = url::Url::parse(&feed.url)
        .map_err(|e| ApiError::BadRequest(format!("invalid feed url: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ApiError::BadRequest(
            "feed url must be http or https".to_string(),
        ));
    }
    if feed.fetch_interval <= 0 {
        return Err(ApiError::BadRequest(
            "fetch_interval must be positive".to_string(),
        ));
    }
    Ok(())
}

/// GET /api/v1/feeds
pub async fn list_feeds(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FeedsQuery>,
) -> Result<Json<Vec<FeedDto>>, ApiError> {
    let rows = feeds::list_feeds(&state.db, query.enabled).await?;
    Ok(Json(rows.into_iter().map(FeedDto::from).collect()))
}

/// POST /api/v1/feeds
pub async fn create_feed(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewFeed>,
) -> Result<(StatusCode, Json<FeedDto>), ApiError> {
    validate_feed(&body)?;

    if feeds::get_feed_by_url(&state.db, &body.url).await?.is_some() {
        return Err(ApiError::Conflict(format!(
            "feed with url '{}' already exists",
            body.url
        )));
    }

    let policy = state.retry_policy();
    let created = retry(&policy, StorageError::is_contended, || {
        feeds::create_feed(&state.db, &body)
    })
    .await?;

    tracing::info!(feed = %created.url, "Feed created");
    Ok((StatusCode::CREATED, Json(FeedDto::from(created))))
}

/// GET /api/v1/feeds/{id}
pub async fn get_feed(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<FeedDto>, ApiError> {
    let feed = feeds::get_feed(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("feed {id} not found")))?;
    Ok(Json(FeedDto::from(feed)))
}

/// PUT /api/v1/feeds/{id}
pub async fn update_feed(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<NewFeed>,
) -> Result<Json<FeedDto>, ApiError> {
    validate_feed(&body)?;

    let policy = state.retry_policy();
    let updated = retry(&policy, StorageError::is_contended, || {
        feeds::update_feed(&state.db, id, &body)
    })
    .await?;
    if !updated {
        return Err(ApiError::NotFound(format!("feed {id} not found")));
    }

    let feed = feeds::get_feed(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("feed {id} not found")))?;
    Ok(Json(FeedDto::from(feed)))
}

/// DELETE /api/v1/feeds/{id}
pub async fn delete_feed(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let policy = state.retry_policy();
    let deleted = retry(&policy, StorageError::is_contended, || {
        feeds::delete_feed(&state.db, id)
    })
    .await?;
    if !deleted {
        return Err(ApiError::NotFound(format!("feed {id} not found")));
    }
    Ok(StatusCode::NO_CONTENT)
}

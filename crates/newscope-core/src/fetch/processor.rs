//! Per-feed fetch-and-ingest pipeline.
//!
//! For one feed: fetch bytes (conditional GET), parse, normalize, dedupe
//! against the store by `(feed, guid)`, persist new items, and advance
//! `next_fetch`. Failures are recorded on the feed with an exponential
//! backoff capped at 24 hours; they never propagate to the scheduler.

use super::parser::{parse_feed, ParsedItem};
use super::{FeedFetcher, FetchOutcome};
use crate::error::StorageError;
use crate::retry::{retry, RetryPolicy};
use crate::storage::feeds::{self, Feed};
use crate::storage::items::{self, NewItem};
use crate::storage::{timestamp, DbPool};
use chrono::{DateTime, Utc};

/// Cap on the fetch-error backoff.
const MAX_BACKOFF_SECS: i64 = 24 * 3600;

/// Result of processing one feed.
#[derive(Debug)]
pub enum FeedOutcome {
    /// The server answered 304; nothing changed.
    NotModified,
    /// The feed was fetched and parsed; `new_items` were inserted.
    Updated {
        /// Number of items this poll actually inserted.
        new_items: u64,
    },
    /// Fetch or parse failed; the error was recorded on the feed.
    Failed {
        /// The recorded error message.
        error: String,
    },
}

/// Processes a single feed end to end.
pub struct FeedProcessor {
    pool: DbPool,
    fetcher: FeedFetcher,
    retry: RetryPolicy,
}

impl FeedProcessor {
    /// Create a processor sharing the store pool and retry policy.
    pub fn new(pool: DbPool, fetcher: FeedFetcher, retry: RetryPolicy) -> Self {
        Self {
            pool,
            fetcher,
            retry,
        }
    }

    /// Fetch and ingest one feed at time `now`.
    ///
    /// Store contention surfaces as an error; everything else is recorded
    /// on the feed row and reported through the outcome.
    pub async fn process(&self, feed: &Feed, now: DateTime<Utc>) -> Result<FeedOutcome, StorageError> {
        let outcome = self
            .fetcher
            .fetch(&feed.url, feed.etag.as_deref(), feed.last_modified.as_deref())
            .await;

        let (bytes, etag, last_modified) = match outcome {
            Ok(FetchOutcome::NotModified) => {
                tracing::debug!(feed = %feed.url, "Feed not modified");
                self.mark_fetched(feed, now, None, None).await?;
                return Ok(FeedOutcome::NotModified);
            }
            Ok(FetchOutcome::Fetched {
                bytes,
                etag,
                last_modified,
            }) => (bytes, etag, last_modified),
            Err(e) => {
                let message = e.to_string();
                self.mark_errored(feed, now, &message).await?;
                return Ok(FeedOutcome::Failed { error: message });
            }
        };

        let parsed = match parse_feed(&bytes) {
            Ok(parsed) => parsed,
            Err(e) => {
                let message = e.to_string();
                self.mark_errored(feed, now, &message).await?;
                return Ok(FeedOutcome::Failed { error: message });
            }
        };

        let new_items = {
            let batch: Vec<NewItem> = parsed
                .items
                .iter()
                .map(|item| normalize_item(feed.id, item))
                .collect();
            retry(&self.retry, StorageError::is_contended, || {
                items::bulk_upsert_items(&self.pool, &batch)
            })
            .await?
        };

        if parsed.title.is_some() || parsed.description.is_some() {
            retry(&self.retry, StorageError::is_contended, || {
                feeds::backfill_feed_metadata(
                    &self.pool,
                    feed.id,
                    parsed.title.as_deref().unwrap_or(""),
                    parsed.description.as_deref().unwrap_or(""),
                )
            })
            .await?;
        }

        self.mark_fetched(feed, now, etag.as_deref(), last_modified.as_deref())
            .await?;

        if new_items > 0 {
            tracing::info!(feed = %feed.url, new_items, "Feed updated");
        }

        Ok(FeedOutcome::Updated { new_items })
    }

    async fn mark_fetched(
        &self,
        feed: &Feed,
        now: DateTime<Utc>,
        etag: Option<&str>,
        last_modified: Option<&str>,
    ) -> Result<(), StorageError> {
        let fetched_at = timestamp(now);
        let next_fetch = timestamp(now + chrono::Duration::seconds(feed.fetch_interval.max(1)));
        retry(&self.retry, StorageError::is_contended, || {
            feeds::update_feed_fetched(
                &self.pool,
                feed.id,
                &fetched_at,
                &next_fetch,
                etag,
                last_modified,
            )
        })
        .await
    }

    async fn mark_errored(
        &self,
        feed: &Feed,
        now: DateTime<Utc>,
        message: &str,
    ) -> Result<(), StorageError> {
        let backoff = error_backoff(feed.fetch_interval, feed.error_count + 1);
        let next_fetch = timestamp(now + backoff);
        tracing::warn!(
            feed = %feed.url,
            error = %message,
            error_count = feed.error_count + 1,
            backoff_secs = backoff.num_seconds(),
            "Feed fetch failed"
        );
        retry(&self.retry, StorageError::is_contended, || {
            feeds::update_feed_error(&self.pool, feed.id, message, &next_fetch)
        })
        .await
    }
}

/// Backoff for the nth consecutive fetch failure:
/// `min(fetch_interval * 2^(n-1), 24h)`.
fn error_backoff(fetch_interval_secs: i64, error_count: i64) -> chrono::Duration {
    let base = fetch_interval_secs.max(1);
    let exponent = (error_count - 1).clamp(0, 30) as u32;
    let backoff = base.saturating_mul(1i64 << exponent);
    chrono::Duration::seconds(backoff.min(MAX_BACKOFF_SECS))
}

fn normalize_item(feed_id: i64, item: &ParsedItem) -> NewItem {
    NewItem {
        feed_id,
        guid: item.guid.clone(),
        title: item.title.clone(),
        link: item.link.clone(),
        description: item.description.clone(),
        content: item.content.clone(),
        author: item.author.clone(),
        published: item.published.map(timestamp),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::feeds::{create_feed, get_feed, NewFeed};
    use crate::storage::init_test_db;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn feed_xml(guids: &[&str]) -> String {
        let items: String = guids
            .iter()
            .map(|g| {
                format!(
                    "<item><guid>{g}</guid><title>Article {g}</title>\
                     <link>https://example.com/{g}</link></item>"
                )
            })
            .collect();
        format!(
            "<?xml version=\"1.0\"?><rss version=\"2.0\"><channel>\
             <title>Test Feed</title><description>For tests</description>{items}\
             </channel></rss>"
        )
    }

    fn test_policy() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            jitter: 0.0,
        }
    }

    async fn processor(pool: &DbPool) -> FeedProcessor {
        FeedProcessor::new(
            pool.clone(),
            FeedFetcher::new(Duration::from_secs(5), "newscope-test").expect("fetcher"),
            test_policy(),
        )
    }

    async fn seed_feed(pool: &DbPool, url: &str) -> Feed {
        create_feed(
            pool,
            &NewFeed {
                url: url.to_string(),
                title: String::new(),
                description: String::new(),
                enabled: true,
                priority: 0,
                fetch_interval: 1800,
            },
        )
        .await
        .expect("feed")
    }

    #[tokio::test]
    async fn two_polls_dedupe_by_guid() {
        let server = MockServer::start().await;
        let pool = init_test_db().await.expect("init db");
        let feed = seed_feed(&pool, &format!("{}/feed.xml", server.uri())).await;
        let processor = processor(&pool).await;

        // First poll serves g1, g2.
        let first = Mock::given(method("GET"))
            .and(path("/feed.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(feed_xml(&["g1", "g2"])))
            .up_to_n_times(1)
            .mount_as_scoped(&server)
            .await;

        let outcome = processor.process(&feed, Utc::now()).await.expect("first poll");
        assert!(matches!(outcome, FeedOutcome::Updated { new_items: 2 }));
        drop(first);

        // Second poll serves g2, g3.
        Mock::given(method("GET"))
            .and(path("/feed.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(feed_xml(&["g2", "g3"])))
            .mount(&server)
            .await;

        let feed = get_feed(&pool, feed.id).await.expect("get").expect("exists");
        let outcome = processor.process(&feed, Utc::now()).await.expect("second poll");
        assert!(matches!(outcome, FeedOutcome::Updated { new_items: 1 }));

        let guids: Vec<(String,)> = sqlx::query_as("SELECT guid FROM items ORDER BY guid")
            .fetch_all(&pool)
            .await
            .expect("guids");
        let guids: Vec<&str> = guids.iter().map(|g| g.0.as_str()).collect();
        assert_eq!(guids, vec!["g1", "g2", "g3"]);
    }

    #[tokio::test]
    async fn success_advances_next_fetch_and_backfills_title() {
        let server = MockServer::start().await;
        let pool = init_test_db().await.expect("init db");
        let feed = seed_feed(&pool, &format!("{}/feed.xml", server.uri())).await;

        Mock::given(method("GET"))
            .and(path("/feed.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(feed_xml(&["g1"])))
            .mount(&server)
            .await;

        let now = Utc::now();
        processor(&pool).await.process(&feed, now).await.expect("process");

        let updated = get_feed(&pool, feed.id).await.expect("get").expect("exists");
        assert_eq!(updated.title, "Test Feed");
        assert_eq!(updated.error_count, 0);
        assert_eq!(
            updated.next_fetch,
            timestamp(now + chrono::Duration::seconds(1800))
        );
    }

    #[tokio::test]
    async fn not_modified_advances_next_fetch_without_items() {
        let server = MockServer::start().await;
        let pool = init_test_db().await.expect("init db");
        let feed = seed_feed(&pool, &format!("{}/feed.xml", server.uri())).await;

        Mock::given(method("GET"))
            .and(path("/feed.xml"))
            .respond_with(ResponseTemplate::new(304))
            .mount(&server)
            .await;

        let outcome = processor(&pool).await.process(&feed, Utc::now()).await.expect("process");
        assert!(matches!(outcome, FeedOutcome::NotModified));
        assert_eq!(
            crate::storage::items::count_items(&pool).await.expect("count"),
            0
        );
    }

    #[tokio::test]
    async fn server_error_records_backoff() {
        let server = MockServer::start().await;
        let pool = init_test_db().await.expect("init db");
        let feed = seed_feed(&pool, &format!("{}/feed.xml", server.uri())).await;

        Mock::given(method("GET"))
            .and(path("/feed.xml"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let now = Utc::now();
        let outcome = processor(&pool).await.process(&feed, now).await.expect("process");
        assert!(matches!(outcome, FeedOutcome::Failed { .. }));

        let updated = get_feed(&pool, feed.id).await.expect("get").expect("exists");
        assert_eq!(updated.error_count, 1);
        assert!(updated.last_error.is_some());
        // First failure backs off by one fetch interval.
        assert_eq!(
            updated.next_fetch,
            timestamp(now + chrono::Duration::seconds(1800))
        );
    }

    #[tokio::test]
    async fn unparseable_body_records_error() {
        let server = MockServer::start().await;
        let pool = init_test_db().await.expect("init db");
        let feed = seed_feed(&pool, &format!("{}/feed.xml", server.uri())).await;

        Mock::given(method("GET"))
            .and(path("/feed.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not a feed"))
            .mount(&server)
            .await;

        let outcome = processor(&pool).await.process(&feed, Utc::now()).await.expect("process");
        assert!(matches!(outcome, FeedOutcome::Failed { .. }));
        let updated = get_feed(&pool, feed.id).await.expect("get").expect("exists");
        assert!(updated.last_error.expect("error").contains("parse"));
    }

    #[test]
    fn backoff_doubles_and_caps_at_24h() {
        assert_eq!(error_backoff(1800, 1).num_seconds(), 1800);
        assert_eq!(error_backoff(1800, 2).num_seconds(), 3600);
        assert_eq!(error_backoff(1800, 3).num_seconds(), 7200);
        assert_eq!(error_backoff(1800, 10).num_seconds(), 86_400);
        assert_eq!(error_backoff(1800, 40).num_seconds(), 86_400);
    }
}

//! Extraction worker loop.
//!
//! Pulls items that still need a full-text extraction attempt, runs a
//! bounded number of extractions concurrently (rate-limited per host),
//! and records success or failure on each item. Failed items leave the
//! queue permanently; the on-demand lane re-enters them when a user asks.

use super::host_limiter::HostLimiter;
use super::{ArticleExtractor, ExtractedArticle};
use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use crate::retry::{retry, RetryPolicy};
use crate::storage::items::{self, Item};
use crate::storage::DbPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use url::Url;

/// Extraction worker pool.
pub struct ExtractionLoop {
    pool: DbPool,
    extractor: Arc<dyn ArticleExtractor>,
    limiter: Arc<HostLimiter>,
    config: ExtractionConfig,
    retry: RetryPolicy,
    semaphore: Arc<Semaphore>,
}

impl ExtractionLoop {
    /// Create the worker pool around an extractor implementation.
    pub fn new(
        pool: DbPool,
        extractor: Arc<dyn ArticleExtractor>,
        config: ExtractionConfig,
        retry: RetryPolicy,
    ) -> Self {
        let limiter = Arc::new(HostLimiter::new(config.host_gap()));
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent.max(1) as usize));
        Self {
            pool,
            extractor,
            limiter,
            config,
            retry,
            semaphore,
        }
    }

    /// Run until cancellation, polling the queue every `poll_interval`
    /// and servicing on-demand requests from the HTTP surface.
    pub async fn run(
        self,
        mut requests: mpsc::Receiver<i64>,
        poll_interval: Duration,
        cancel: CancellationToken,
    ) {
        tracing::info!(
            max_concurrent = self.config.max_concurrent,
            min_text_length = self.config.min_text_length,
            "Extraction loop started"
        );

        let tracker = TaskTracker::new();
        let mut requests_open = true;

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                request = requests.recv(), if requests_open => {
                    match request {
                        Some(item_id) => self.spawn_request(&tracker, item_id, &cancel).await,
                        None => requests_open = false,
                    }
                }
                () = tokio::time::sleep(poll_interval) => {
                    if let Err(e) = self.run_once(&tracker, &cancel).await {
                        tracing::warn!(error = %e, "Extraction batch failed");
                    }
                }
            }
        }

        tracker.close();
        tracker.wait().await;
        tracing::info!("Extraction loop stopped");
    }

    /// Pull one batch from the queue and spawn an extraction per item.
    pub async fn run_once(
        &self,
        tracker: &TaskTracker,
        cancel: &CancellationToken,
    ) -> Result<usize, crate::error::StorageError> {
        let batch_limit = self.config.max_concurrent.max(1) * 2;
        let batch = items::list_items_needing_extraction(&self.pool, batch_limit).await?;
        let count = batch.len();

        for item in batch {
            if cancel.is_cancelled() {
                break;
            }
            self.spawn_item(tracker, item, cancel).await;
        }

        Ok(count)
    }

    async fn spawn_request(&self, tracker: &TaskTracker, item_id: i64, cancel: &CancellationToken) {
        match items::get_item(&self.pool, item_id).await {
            Ok(Some(item)) => self.spawn_item(tracker, item, cancel).await,
            Ok(None) => tracing::warn!(item_id, "On-demand extraction for unknown item"),
            Err(e) => tracing::warn!(item_id, error = %e, "Failed to load item for extraction"),
        }
    }

    async fn spawn_item(&self, tracker: &TaskTracker, item: Item, cancel: &CancellationToken) {
        let permit = tokio::select! {
            () = cancel.cancelled() => return,
            permit = self.semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return,
            },
        };

        let pool = self.pool.clone();
        let extractor = self.extractor.clone();
        let limiter = self.limiter.clone();
        let config = self.config.clone();
        let retry_policy = self.retry.clone();
        let cancel = cancel.clone();

        tracker.spawn(async move {
            let _permit = permit;
            tokio::select! {
                () = cancel.cancelled() => {}
                () = process_item(&pool, &*extractor, &limiter, &config, &retry_policy, &item) => {}
            }
        });
    }
}

/// Extract one item and record the attempt, success or failure.
async fn process_item(
    pool: &DbPool,
    extractor: &dyn ArticleExtractor,
    limiter: &HostLimiter,
    config: &ExtractionConfig,
    retry_policy: &RetryPolicy,
    item: &Item,
) {
    let result = extract_one(extractor, limiter, config, item).await;

    let write = match &result {
        Ok(article) => {
            tracing::debug!(item_id = item.id, chars = article.text.len(), "Extracted item");
            retry(retry_policy, crate::error::StorageError::is_contended, || {
                items::update_item_extraction(pool, item.id, &article.text, &article.rich_html, None)
            })
            .await
        }
        Err(e) => {
            tracing::debug!(item_id = item.id, error = %e, "Extraction failed");
            let message = e.to_string();
            retry(retry_policy, crate::error::StorageError::is_contended, || {
                items::update_item_extraction(pool, item.id, "", "", Some(&message))
            })
            .await
        }
    };

    if let Err(e) = write {
        tracing::warn!(item_id = item.id, error = %e, "Failed to record extraction");
    }
}

async fn extract_one(
    extractor: &dyn ArticleExtractor,
    limiter: &HostLimiter,
    config: &ExtractionConfig,
    item: &Item,
) -> Result<ExtractedArticle, ExtractError> {
    if item.link.is_empty() {
        return Err(ExtractError::Unreadable("item has no link".to_string()));
    }

    let host = Url::parse(&item.link)?
        .host_str()
        .unwrap_or("unknown")
        .to_string();
    limiter.acquire(&host).await;

    let article = tokio::time::timeout(config.timeout(), extractor.extract(&item.link))
        .await
        .map_err(|_| ExtractError::Unreadable("extraction timed out".to_string()))??;

    let length = article.text.chars().count();
    let min = config.min_text_length as usize;
    if length < min {
        return Err(ExtractError::TooShort { length, min });
    }

    Ok(article)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::feeds::{create_feed, NewFeed};
    use crate::storage::init_test_db;
    use crate::storage::items::{upsert_item, NewItem};
    use std::sync::Mutex;

    struct MockExtractor {
        text: String,
        fail: bool,
        calls: Mutex<Vec<String>>,
    }

    impl MockExtractor {
        fn returning(text: &str) -> Self {
            Self {
                text: text.to_string(),
                fail: false,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                text: String::new(),
                fail: true,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl ArticleExtractor for MockExtractor {
        async fn extract(&self, url: &str) -> Result<ExtractedArticle, ExtractError> {
            self.calls.lock().expect("lock").push(url.to_string());
            if self.fail {
                return Err(ExtractError::Unreadable("boom".to_string()));
            }
            Ok(ExtractedArticle {
                text: self.text.clone(),
                rich_html: format!("<p>{}</p>", self.text),
            })
        }
    }

    fn test_config(min_text_length: u32) -> ExtractionConfig {
        ExtractionConfig {
            min_text_length,
            rate_limit: 0,
            ..ExtractionConfig::default()
        }
    }

    fn test_policy() -> RetryPolicy {
        RetryPolicy {
            attempts: 2,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            jitter: 0.0,
        }
    }

    async fn seed_item(pool: &DbPool, link: &str) -> i64 {
        let feed = create_feed(
            pool,
            &NewFeed {
                url: "https://example.com/rss".to_string(),
                title: String::new(),
                description: String::new(),
                enabled: true,
                priority: 0,
                fetch_interval: 1800,
            },
        )
        .await
        .expect("feed");
        upsert_item(
            pool,
            &NewItem {
                feed_id: feed.id,
                guid: "g1".to_string(),
                title: "Article".to_string(),
                link: link.to_string(),
                description: String::new(),
                content: String::new(),
                author: String::new(),
                published: None,
            },
        )
        .await
        .expect("item");
        let row: (i64,) = sqlx::query_as("SELECT id FROM items LIMIT 1")
            .fetch_one(pool)
            .await
            .expect("id");
        row.0
    }

    async fn run_batch(pool: &DbPool, extractor: Arc<dyn ArticleExtractor>, min_len: u32) {
        let worker = ExtractionLoop::new(pool.clone(), extractor, test_config(min_len), test_policy());
        let tracker = TaskTracker::new();
        let cancel = CancellationToken::new();
        worker.run_once(&tracker, &cancel).await.expect("run once");
        tracker.close();
        tracker.wait().await;
    }

    #[tokio::test]
    async fn successful_extraction_is_recorded() {
        let pool = init_test_db().await.expect("init db");
        let id = seed_item(&pool, "https://example.com/story").await;

        let long_text = "word ".repeat(100);
        run_batch(&pool, Arc::new(MockExtractor::returning(&long_text)), 200).await;

        let item = items::get_item(&pool, id).await.expect("get").expect("exists");
        assert!(item.extracted_at.is_some());
        assert!(item.extraction_error.is_none());
        assert_eq!(item.extracted_content.as_deref(), Some(long_text.as_str()));
    }

    #[tokio::test]
    async fn short_content_is_rejected() {
        let pool = init_test_db().await.expect("init db");
        let id = seed_item(&pool, "https://example.com/story").await;

        run_batch(&pool, Arc::new(MockExtractor::returning("too little")), 200).await;

        let item = items::get_item(&pool, id).await.expect("get").expect("exists");
        assert!(item.extracted_at.is_some(), "attempt is recorded");
        assert!(item
            .extraction_error
            .expect("error")
            .starts_with("content too short"));
    }

    #[tokio::test]
    async fn failed_item_leaves_the_queue() {
        let pool = init_test_db().await.expect("init db");
        seed_item(&pool, "https://example.com/story").await;

        run_batch(&pool, Arc::new(MockExtractor::failing()), 0).await;

        let pending = items::list_items_needing_extraction(&pool, 10)
            .await
            .expect("pending");
        assert!(pending.is_empty(), "failures are not retried automatically");
    }

    #[tokio::test]
    async fn missing_link_is_an_extraction_error() {
        let pool = init_test_db().await.expect("init db");
        let id = seed_item(&pool, "").await;

        run_batch(&pool, Arc::new(MockExtractor::returning("ignored")), 0).await;

        let item = items::get_item(&pool, id).await.expect("get").expect("exists");
        assert!(item
            .extraction_error
            .expect("error")
            .contains("no link"));
    }

    #[tokio::test]
    async fn loop_exits_promptly_on_cancellation() {
        let pool = init_test_db().await.expect("init db");
        let worker = ExtractionLoop::new(
            pool.clone(),
            Arc::new(MockExtractor::returning("x")),
            test_config(0),
            test_policy(),
        );
        let (_tx, rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(worker.run(rx, Duration::from_secs(60), cancel.clone()));
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("prompt shutdown")
            .expect("join");
    }

    #[tokio::test]
    async fn on_demand_request_extracts_item() {
        let pool = init_test_db().await.expect("init db");
        let id = seed_item(&pool, "https://example.com/story").await;

        let worker = ExtractionLoop::new(
            pool.clone(),
            Arc::new(MockExtractor::returning("requested text")),
            test_config(0),
            test_policy(),
        );
        let (tx, rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(worker.run(rx, Duration::from_secs(60), cancel.clone()));

        tx.send(id).await.expect("send request");
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        handle.await.expect("join");

        let item = items::get_item(&pool, id).await.expect("get").expect("exists");
        assert_eq!(item.extracted_content.as_deref(), Some("requested text"));
    }
}

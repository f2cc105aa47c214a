//! Classification worker loop.
//!
//! Pulls batches of extraction-complete items (oldest first), builds the
//! classification context from the store, asks the classifier, and
//! persists each result independently through the retry wrapper. A batch
//! that fails after all retries is simply left eligible for the next
//! tick; no partial classification is persisted for failed batches.

use super::{ClassificationContext, Classifier, ClassifyItem};
use crate::config::ClassificationConfig;
use crate::retry::{retry, RetryPolicy};
use crate::storage::items::{self, Item, ProcessedFields};
use crate::storage::settings::load_preference_summary;
use crate::storage::views::{distinct_topics, recent_feedback};
use crate::storage::{feeds, DbPool};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Cap on the canonical-topics list included in prompts.
const MAX_CANONICAL_TOPICS: usize = 50;

/// Classification worker.
pub struct ClassificationLoop {
    pool: DbPool,
    classifier: Arc<dyn Classifier>,
    config: ClassificationConfig,
    extraction_enabled: bool,
    retry: RetryPolicy,
}

impl ClassificationLoop {
    /// Create the worker around a classifier implementation.
    pub fn new(
        pool: DbPool,
        classifier: Arc<dyn Classifier>,
        config: ClassificationConfig,
        extraction_enabled: bool,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            pool,
            classifier,
            config,
            extraction_enabled,
            retry,
        }
    }

    /// Run until cancellation, polling for eligible items.
    ///
    /// Full batches drain back-to-back; an empty or failed batch waits
    /// out the poll interval.
    pub async fn run(&self, poll_interval: Duration, cancel: CancellationToken) {
        tracing::info!(
            batch_size = self.config.batch_size,
            extraction_enabled = self.extraction_enabled,
            "Classification loop started"
        );

        loop {
            let classified = match self.run_once().await {
                Ok(count) => count,
                Err(e) => {
                    tracing::warn!(error = %e, "Classification batch failed");
                    0
                }
            };

            // Keep draining while full batches come back.
            if classified as u32 >= self.config.batch_size && !cancel.is_cancelled() {
                continue;
            }

            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(poll_interval) => {}
            }
        }

        tracing::info!("Classification loop stopped");
    }

    /// Classify one batch. Returns the number of items persisted.
    pub async fn run_once(&self) -> Result<usize, crate::error::StorageError> {
        let batch = items::list_items_needing_classification(
            &self.pool,
            self.extraction_enabled,
            self.config.batch_size.max(1),
        )
        .await?;
        if batch.is_empty() {
            return Ok(0);
        }

        let ctx = self.build_context().await?;
        let classify_items: Vec<ClassifyItem> = batch.iter().map(to_classify_item).collect();
        let by_guid: HashMap<&str, &Item> = batch
            .iter()
            .zip(&classify_items)
            .map(|(item, ci)| (ci.guid.as_str(), item))
            .collect();

        let classifications = match self.classifier.classify(&classify_items, &ctx).await {
            Ok(classifications) => classifications,
            Err(e) => {
                // Leave the whole batch eligible for the next tick.
                tracing::warn!(batch = batch.len(), error = %e, "Classifier gave up on batch");
                return Ok(0);
            }
        };

        let mut persisted = 0usize;
        let mut touched_feeds: HashSet<i64> = HashSet::new();
        for classification in &classifications {
            let Some(item) = by_guid.get(classification.guid.as_str()) else {
                continue;
            };

            let fields = ProcessedFields {
                extracted_content: None,
                extracted_rich_content: None,
                relevance_score: classification.score,
                explanation: classification.explanation.clone(),
                topics: classification.topics.clone(),
                summary: classification.summary.clone(),
            };
            retry(&self.retry, crate::error::StorageError::is_contended, || {
                items::update_item_processed(&self.pool, item.id, &fields)
            })
            .await?;

            persisted += 1;
            touched_feeds.insert(item.feed_id);
        }

        for feed_id in touched_feeds {
            retry(&self.retry, crate::error::StorageError::is_contended, || {
                feeds::update_feed_avg_score(&self.pool, feed_id)
            })
            .await?;
        }

        tracing::info!(batch = batch.len(), persisted, "Classified batch");
        Ok(persisted)
    }

    async fn build_context(&self) -> Result<ClassificationContext, crate::error::StorageError> {
        let preference = load_preference_summary(&self.pool).await?;
        let mut canonical_topics = distinct_topics(&self.pool).await?;
        canonical_topics.truncate(MAX_CANONICAL_TOPICS);
        let examples =
            recent_feedback(&self.pool, None, self.config.feedback_examples).await?;

        Ok(ClassificationContext {
            preference_summary: if preference.enabled {
                preference.summary
            } else {
                String::new()
            },
            canonical_topics,
            preferred_topics: self.config.preferred_topics.clone(),
            avoided_topics: self.config.avoided_topics.clone(),
            examples,
        })
    }
}

/// Render an item for the batch prompt. The guid is derived from the row
/// ID so results map back without extra state.
fn to_classify_item(item: &Item) -> ClassifyItem {
    let content = match item.extracted_content.as_deref() {
        Some(text) if !text.is_empty() => text.to_string(),
        _ if !item.content.is_empty() => item.content.clone(),
        _ => item.description.clone(),
    };
    ClassifyItem {
        guid: format!("item-{}", item.id),
        title: item.title.clone(),
        description: item.description.clone(),
        content,
    }
}

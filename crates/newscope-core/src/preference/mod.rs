//! Feedback-driven preference-summary maintenance.
//!
//! Feedback events from the HTTP surface flow through a channel into the
//! maintainer. An atomic counter (seeded from and mirrored to the
//! settings store) tracks feedback since the last summary update; when it
//! crosses the configured threshold the maintainer regenerates or refines
//! the summary via the classifier capability. A single-flight guard
//! collapses concurrent bursts into one run.

use crate::classify::Classifier;
use crate::error::StorageError;
use crate::retry::{retry, RetryPolicy};
use crate::storage::settings::{
    load_preference_summary, store_preference_summary, PreferenceSummary,
};
use crate::storage::views::recent_feedback;
use crate::storage::DbPool;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Tracks feedback counts and guards summary updates.
///
/// The only process-wide mutable state outside the store: an atomic
/// counter and the single-flight token.
pub struct FeedbackTracker {
    count: AtomicU32,
    threshold: u32,
    in_flight: AtomicBool,
}

impl FeedbackTracker {
    /// Create a tracker with the configured threshold, seeded with the
    /// persisted count from a previous run.
    pub fn new(threshold: u32, initial_count: u32) -> Self {
        Self {
            count: AtomicU32::new(initial_count),
            threshold: threshold.max(1),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Record one feedback event; returns the new count.
    pub fn record(&self) -> u32 {
        self.count.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Current count of feedback events since the last summary update.
    pub fn count(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }

    /// Whether the threshold has been crossed.
    pub fn threshold_reached(&self) -> bool {
        self.count() >= self.threshold
    }

    /// Reset the counter after a summary update.
    pub fn reset(&self) {
        self.count.store(0, Ordering::SeqCst);
    }

    /// Claim the single-flight token. Returns `None` while another update
    /// is running; the returned guard releases the token on drop.
    pub fn try_begin_update(&self) -> Option<UpdateGuard<'_>> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            Some(UpdateGuard { tracker: self })
        } else {
            None
        }
    }
}

/// RAII token for a running summary update.
pub struct UpdateGuard<'a> {
    tracker: &'a FeedbackTracker,
}

impl Drop for UpdateGuard<'_> {
    fn drop(&mut self) {
        self.tracker.in_flight.store(false, Ordering::SeqCst);
    }
}

/// Maintains the preference summary from accumulated feedback.
pub struct PreferenceMaintainer {
    pool: DbPool,
    classifier: Arc<dyn Classifier>,
    tracker: Arc<FeedbackTracker>,
    feedback_examples: u32,
    retry: RetryPolicy,
}

impl PreferenceMaintainer {
    /// Create the maintainer.
    pub fn new(
        pool: DbPool,
        classifier: Arc<dyn Classifier>,
        tracker: Arc<FeedbackTracker>,
        feedback_examples: u32,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            pool,
            classifier,
            tracker,
            feedback_examples,
            retry,
        }
    }

    /// Consume feedback events until cancellation.
    ///
    /// Events are processed sequentially, so threshold crossings during a
    /// running update are observed afterwards against the reset counter,
    /// so bursts collapse into a single regeneration.
    pub async fn run(&self, mut events: mpsc::Receiver<()>, cancel: CancellationToken) {
        tracing::info!(
            threshold = self.tracker.threshold,
            "Preference maintainer started"
        );

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                event = events.recv() => {
                    if event.is_none() {
                        break;
                    }
                    self.on_feedback().await;
                }
            }
        }

        tracing::info!("Preference maintainer stopped");
    }

    /// Handle one feedback event: bump the counter, persist it, and run a
    /// summary update when the threshold is crossed.
    pub async fn on_feedback(&self) {
        let count = self.tracker.record();
        if let Err(e) = self.persist_count(count).await {
            tracing::warn!(error = %e, "Failed to persist feedback counter");
        }

        if !self.tracker.threshold_reached() {
            return;
        }
        let Some(_guard) = self.tracker.try_begin_update() else {
            tracing::debug!("Summary update already in flight, collapsing trigger");
            return;
        };

        if let Err(e) = self.update_summary().await {
            tracing::warn!(error = %e, "Preference summary update failed");
        }
    }

    /// Regenerate or refine the summary from recent feedback.
    pub async fn update_summary(&self) -> Result<(), StorageError> {
        let mut record = load_preference_summary(&self.pool).await?;

        if !record.enabled {
            tracing::debug!("Preference summary disabled, skipping update");
            self.tracker.reset();
            record.updates_since_last_summary = 0;
            return self.persist(&record).await;
        }

        let examples = recent_feedback(&self.pool, None, self.feedback_examples).await?;
        if examples.is_empty() {
            tracing::debug!("No feedback examples, skipping summary update");
            self.tracker.reset();
            record.updates_since_last_summary = 0;
            return self.persist(&record).await;
        }

        let result = if record.summary.is_empty() {
            self.classifier.generate_summary(&examples).await
        } else {
            self.classifier
                .update_summary(&record.summary, &examples)
                .await
        };

        match result {
            Ok(summary) if !summary.is_empty() => {
                tracing::info!(chars = summary.len(), "Preference summary updated");
                record.summary = summary;
                record.updates_since_last_summary = 0;
                record.last_updated_at = Some(crate::storage::now_timestamp());
                self.tracker.reset();
                self.persist(&record).await
            }
            Ok(_) => {
                tracing::warn!("Classifier returned an empty summary, keeping the old one");
                Ok(())
            }
            Err(e) => {
                // Counter stays put; the next feedback event retriggers.
                tracing::warn!(error = %e, "Summary generation failed");
                Ok(())
            }
        }
    }

    async fn persist_count(&self, count: u32) -> Result<(), StorageError> {
        let mut record = load_preference_summary(&self.pool).await?;
        record.updates_since_last_summary = count;
        self.persist(&record).await
    }

    async fn persist(&self, record: &PreferenceSummary) -> Result<(), StorageError> {
        retry(&self.retry, StorageError::is_contended, || {
            store_preference_summary(&self.pool, record)
        })
        .await
    }
}

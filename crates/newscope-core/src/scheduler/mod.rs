//! Scheduler runtime and the periodic loops it drives.
//!
//! The [`Runtime`] owns a `CancellationToken` shared by every loop and
//! collects named `JoinHandle`s for graceful shutdown within a bounded
//! drain window. The fetch scheduler ticks at a fixed cadence, selects
//! due feeds in priority order, and dispatches them to a bounded worker
//! pool with non-blocking offer: when no worker slot is free the feed is
//! skipped this tick and picked up again on the next one (its
//! `next_fetch` is untouched).

use crate::config::ScheduleConfig;
use crate::fetch::processor::FeedProcessor;
use crate::storage::{cleanup, feeds, now_timestamp, DbPool};
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// How long shutdown waits for in-flight workers before giving up.
const DRAIN_WINDOW: Duration = Duration::from_secs(10);

/// Due-feed query over-selects by this factor so backpressure skips
/// still leave the pool saturated.
const DUE_FACTOR: u32 = 4;

/// Runtime that manages the pipeline's concurrent task lifecycles.
pub struct Runtime {
    cancel: CancellationToken,
    handles: Vec<(String, JoinHandle<()>)>,
}

impl Runtime {
    /// Create a new runtime with a fresh cancellation token.
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            handles: Vec::new(),
        }
    }

    /// Return a clone of the cancellation token for passing to tasks.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Spawn a pipeline task with a descriptive name.
    pub fn spawn<F>(&mut self, name: impl Into<String>, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        tracing::info!(task = %name, "Spawning pipeline task");
        let handle = tokio::spawn(future);
        self.handles.push((name, handle));
    }

    /// Number of spawned tasks.
    pub fn task_count(&self) -> usize {
        self.handles.len()
    }

    /// Initiate graceful shutdown: cancel the token, then await every
    /// task up to the drain window.
    pub async fn shutdown(&mut self) {
        tracing::info!("Initiating graceful shutdown");
        self.cancel.cancel();

        let handles: Vec<_> = self.handles.drain(..).collect();
        let drain = async {
            for (name, handle) in handles {
                match handle.await {
                    Ok(()) => tracing::info!(task = %name, "Task completed cleanly"),
                    Err(e) => {
                        tracing::warn!(task = %name, error = %e, "Task panicked during shutdown")
                    }
                }
            }
        };

        if tokio::time::timeout(DRAIN_WINDOW, drain).await.is_err() {
            tracing::warn!(
                window_secs = DRAIN_WINDOW.as_secs(),
                "Drain window exceeded, some tasks may still be running"
            );
        } else {
            tracing::info!("Graceful shutdown complete");
        }
    }

    /// Block until a shutdown signal arrives, then gracefully stop.
    pub async fn run_until_shutdown(mut self) {
        wait_for_shutdown_signal().await;
        self.shutdown().await;
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for an OS shutdown signal (Ctrl+C or SIGTERM).
pub async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to register SIGTERM handler, using Ctrl+C only");
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                } else {
                    tracing::info!("Received Ctrl+C");
                }
                return;
            }
        };

        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "Ctrl+C handler error");
                }
                tracing::info!("Received Ctrl+C");
            }
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        } else {
            tracing::info!("Received Ctrl+C");
        }
    }
}

/// Run the fetch scheduler until cancellation.
///
/// Each tick selects feeds whose `next_fetch` has passed (priority
/// descending, most overdue first) and offers each to the worker pool.
/// The offer is non-blocking: with no free slot the feed is skipped and
/// retried next tick.
pub async fn run_fetch_scheduler(
    pool: DbPool,
    processor: Arc<FeedProcessor>,
    config: ScheduleConfig,
    cancel: CancellationToken,
) {
    let max_workers = config.max_workers.max(1);
    let slots = Arc::new(Semaphore::new(max_workers as usize));
    let tracker = TaskTracker::new();

    tracing::info!(
        interval_secs = config.update_interval,
        max_workers,
        "Fetch scheduler started"
    );

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(config.update_interval()) => {}
        }

        let due = match feeds::feeds_due_for_update(&pool, &now_timestamp(), max_workers * DUE_FACTOR)
            .await
        {
            Ok(due) => due,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to query due feeds");
                continue;
            }
        };

        if due.is_empty() {
            continue;
        }
        tracing::debug!(due = due.len(), "Dispatching due feeds");

        for feed in due {
            let Ok(permit) = slots.clone().try_acquire_owned() else {
                tracing::debug!(feed = %feed.url, "Worker pool full, skipping feed this tick");
                break;
            };

            let processor = processor.clone();
            let cancel = cancel.clone();
            tracker.spawn(async move {
                let _permit = permit;
                tokio::select! {
                    () = cancel.cancelled() => {}
                    result = processor.process(&feed, Utc::now()) => {
                        if let Err(e) = result {
                            tracing::warn!(feed = %feed.url, error = %e, "Feed processing failed");
                        }
                    }
                }
            });
        }
    }

    tracker.close();
    tracker.wait().await;
    tracing::info!("Fetch scheduler stopped");
}

/// Run the retention loop until cancellation.
pub async fn run_cleanup_loop(pool: DbPool, config: ScheduleConfig, cancel: CancellationToken) {
    tracing::info!(
        interval_secs = config.cleanup_interval,
        age_secs = config.cleanup_age,
        min_score = config.cleanup_min_score,
        "Cleanup loop started"
    );

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(config.cleanup_interval()) => {}
        }

        match cleanup::run_cleanup(
            &pool,
            Duration::from_secs(config.cleanup_age),
            config.cleanup_min_score,
            Duration::from_secs(config.feedback_retention),
        )
        .await
        {
            Ok(stats) if stats.total_deleted > 0 => {
                tracing::info!(deleted = stats.total_deleted, "Retention pass deleted rows");
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "Retention pass failed"),
        }
    }

    tracing::info!("Cleanup loop stopped");
}

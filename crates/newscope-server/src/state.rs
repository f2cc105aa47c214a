//! Shared application state for the Newscope server.

use std::time::Instant;

use newscope_core::config::Config;
use newscope_core::retry::RetryPolicy;
use newscope_core::storage::DbPool;
use tokio::sync::mpsc;

/// Shared application state accessible by all route handlers.
pub struct AppState {
    /// SQLite connection pool.
    pub db: DbPool,
    /// Loaded daemon configuration.
    pub config: Config,
    /// Feedback events toward the preference maintainer.
    pub feedback_tx: mpsc::Sender<()>,
    /// On-demand extraction requests toward the extraction loop.
    pub extract_tx: mpsc::Sender<i64>,
    /// Process start time, for the status endpoint's uptime.
    pub started_at: Instant,
}

impl AppState {
    /// Retry policy for store writes performed by handlers.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.config.schedule.retry_policy()
    }
}

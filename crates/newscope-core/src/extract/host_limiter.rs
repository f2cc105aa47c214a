//! Process-wide per-host rate limiter for article fetches.
//!
//! Keeps an LRU map of host -> next allowed request slot and makes each
//! caller wait out the remaining gap. Reservation happens under the lock,
//! so concurrent callers for the same host serialize instead of stampeding.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Number of hosts tracked before the least recently used entry is evicted.
const HOST_CAPACITY: usize = 256;

/// Minimum-gap limiter keyed by URL host.
pub struct HostLimiter {
    min_gap: Duration,
    slots: Mutex<LruCache<String, Instant>>,
}

impl HostLimiter {
    /// Create a limiter enforcing `min_gap` between requests per host.
    pub fn new(min_gap: Duration) -> Self {
        Self {
            min_gap,
            slots: Mutex::new(LruCache::new(
                NonZeroUsize::new(HOST_CAPACITY).expect("nonzero capacity"),
            )),
        }
    }

    /// Reserve the next request slot for `host` and wait until it arrives.
    pub async fn acquire(&self, host: &str) {
        if self.min_gap.is_zero() {
            return;
        }

        let scheduled = {
            let mut slots = self.slots.lock().await;
            let now = Instant::now();
            let scheduled = match slots.get(host) {
                Some(last) => (*last + self.min_gap).max(now),
                None => now,
            };
            slots.put(host.to_string(), scheduled);
            scheduled
        };

        tokio::time::sleep_until(scheduled).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_request_is_immediate() {
        let limiter = HostLimiter::new(Duration::from_millis(100));
        let start = Instant::now();
        limiter.acquire("example.com").await;
        assert!(start.elapsed() < Duration::from_millis(20));
    }

    #[tokio::test]
    async fn same_host_waits_out_the_gap() {
        let limiter = HostLimiter::new(Duration::from_millis(50));
        let start = Instant::now();
        limiter.acquire("example.com").await;
        limiter.acquire("example.com").await;
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn different_hosts_do_not_interfere() {
        let limiter = HostLimiter::new(Duration::from_millis(200));
        let start = Instant::now();
        limiter.acquire("a.example.com").await;
        limiter.acquire("b.example.com").await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn concurrent_callers_serialize() {
        let limiter = std::sync::Arc::new(HostLimiter::new(Duration::from_millis(40)));
        let start = Instant::now();

        let tasks: Vec<_> = (0..3)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.acquire("example.com").await })
            })
            .collect();
        for task in tasks {
            task.await.expect("join");
        }

        // Three requests with a 40ms gap need at least 80ms in total.
        assert!(start.elapsed() >= Duration::from_millis(80));
    }

    #[tokio::test]
    async fn zero_gap_never_waits() {
        let limiter = HostLimiter::new(Duration::ZERO);
        let start = Instant::now();
        for _ in 0..10 {
            limiter.acquire("example.com").await;
        }
        assert!(start.elapsed() < Duration::from_millis(20));
    }
}

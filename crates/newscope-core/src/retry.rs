//! Uniform retry wrapper with exponential backoff and jitter.
//!
//! Every store write goes through [`retry`] with the schedule's policy,
//! retrying only contended-database errors. LLM transport calls reuse the
//! same wrapper with their own policy and their own retryability predicate,
//! so backoff lives in one place instead of at each call site.

use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Backoff parameters for a retried operation.
///
/// The delay before attempt `n + 1` is
/// `min(max_delay, initial_delay * 2^(n-1)) * (1 ± rand * jitter)`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of attempts (1 = no retries).
    pub attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on the exponential delay, before jitter.
    pub max_delay: Duration,
    /// Jitter fraction in `[0, 1]` applied symmetrically around the delay.
    pub jitter: f64,
}

impl RetryPolicy {
    /// Compute the backoff delay after the given failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let initial = self.initial_delay.as_millis() as u64;
        let max = self.max_delay.as_millis() as u64;
        let exp = initial.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
        let capped = exp.min(max);

        let jitter = self.jitter.clamp(0.0, 1.0);
        let factor = if jitter > 0.0 {
            1.0 + rand::thread_rng().gen_range(-jitter..=jitter)
        } else {
            1.0
        };

        Duration::from_millis((capped as f64 * factor).round() as u64)
    }
}

/// Run `op` up to `policy.attempts` times, sleeping between attempts.
///
/// Only errors for which `is_retryable` returns true are retried; all
/// other errors surface immediately. The final error is returned once
/// attempts are exhausted.
pub async fn retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    is_retryable: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.attempts && is_retryable(&err) => {
                let delay = policy.delay_for(attempt);
                tracing::debug!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "retrying after transient error"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            jitter: 0.0,
        }
    }

    #[test]
    fn delay_doubles_and_caps() {
        let p = policy(5);
        assert_eq!(p.delay_for(1), Duration::from_millis(1));
        assert_eq!(p.delay_for(2), Duration::from_millis(2));
        assert_eq!(p.delay_for(3), Duration::from_millis(4));
        assert_eq!(p.delay_for(10), Duration::from_millis(4));
    }

    #[test]
    fn delay_with_jitter_stays_in_bounds() {
        let p = RetryPolicy {
            attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(100),
            jitter: 0.5,
        };
        for _ in 0..100 {
            let d = p.delay_for(1).as_millis() as u64;
            assert!((50..=150).contains(&d), "delay {d}ms outside jitter bounds");
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, &str> = retry(&policy(5), |_| true, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err("busy")
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_error_surfaces_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, &str> = retry(&policy(5), |e| *e == "busy", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("constraint violation") }
        })
        .await;

        assert_eq!(result, Err("constraint violation"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_attempts_and_returns_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, &str> = retry(&policy(3), |_| true, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("busy") }
        })
        .await;

        assert_eq!(result, Err("busy"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}

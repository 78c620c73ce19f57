//! Rate limiting for abuse-prone endpoints
//!
//! Fixed-window request counting per client key. The retry endpoint creates
//! a gateway bill per call, so it is the one surface that must not be
//! hammerable from a single client.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Debug)]
struct WindowCounter {
    window_start: Instant,
    count: u32,
}

/// Outcome of a rate check that refused the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateExceeded {
    /// Seconds until the current window rolls over.
    pub retry_after_secs: u64,
}

/// Per-client fixed-window rate limiter.
#[derive(Clone)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    counters: Arc<RwLock<HashMap<String, WindowCounter>>>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            counters: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Counts one request against `key`. Returns the remaining allowance,
    /// or how long the client must wait.
    pub async fn check(&self, key: &str) -> Result<u32, RateExceeded> {
        let mut counters = self.counters.write().await;
        let now = Instant::now();

        let counter = counters.entry(key.to_string()).or_insert(WindowCounter {
            window_start: now,
            count: 0,
        });

        if now.duration_since(counter.window_start) >= self.window {
            counter.window_start = now;
            counter.count = 0;
        }

        if counter.count >= self.max_requests {
            let elapsed = now.duration_since(counter.window_start);
            let remaining_window = self.window.saturating_sub(elapsed);
            return Err(RateExceeded {
                retry_after_secs: remaining_window.as_secs().max(1),
            });
        }

        counter.count += 1;
        Ok(self.max_requests - counter.count)
    }

    /// Drops counters whose window has long expired.
    pub async fn cleanup(&self) {
        let mut counters = self.counters.write().await;
        let cutoff = self.window * 2;
        counters.retain(|_, counter| counter.window_start.elapsed() < cutoff);
    }
}

/// Periodically evicts stale counters so the map does not grow unbounded.
pub fn start_cleanup_task(limiter: RateLimiter, interval: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(interval);
        loop {
            interval.tick().await;
            limiter.cleanup().await;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_up_to_the_limit_then_refuses() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));

        for i in 0..3 {
            let remaining = limiter.check("ip:1.2.3.4").await;
            assert!(remaining.is_ok(), "request {} should be allowed", i);
        }

        let refused = limiter.check("ip:1.2.3.4").await;
        let exceeded = refused.unwrap_err();
        assert!(exceeded.retry_after_secs >= 1);
    }

    #[tokio::test]
    async fn keys_are_counted_independently() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));

        assert!(limiter.check("ip:1.1.1.1").await.is_ok());
        assert!(limiter.check("ip:2.2.2.2").await.is_ok());
        assert!(limiter.check("ip:1.1.1.1").await.is_err());
    }

    #[tokio::test]
    async fn window_rollover_resets_the_count() {
        let limiter = RateLimiter::new(1, Duration::from_millis(20));

        assert!(limiter.check("ip:1.2.3.4").await.is_ok());
        assert!(limiter.check("ip:1.2.3.4").await.is_err());

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(limiter.check("ip:1.2.3.4").await.is_ok());
    }

    #[tokio::test]
    async fn cleanup_drops_stale_counters() {
        let limiter = RateLimiter::new(5, Duration::from_millis(10));
        let _ = limiter.check("ip:1.2.3.4").await;

        tokio::time::sleep(Duration::from_millis(30)).await;
        limiter.cleanup().await;

        let counters = limiter.counters.read().await;
        assert!(counters.is_empty());
    }
}

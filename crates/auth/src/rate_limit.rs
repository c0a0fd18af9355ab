//! Fixed-window rate limiting kept in process memory.
//!
//! Counters live in an LRU map so a flood of distinct keys cannot grow it
//! without bound. Multi-instance deployments would need a shared store.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;

const DEFAULT_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

#[derive(Debug)]
pub struct RateLimiter {
    windows: Mutex<LruCache<String, Window>>,
    limit: u32,
    window: Duration,
}

impl RateLimiter {
    /// Allows `limit` hits per key within each `window`.
    pub fn new(limit: u32, window: Duration) -> Self {
        Self::with_capacity(limit, window, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(limit: u32, window: Duration, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            windows: Mutex::new(LruCache::new(capacity)),
            limit,
            window,
        }
    }

    /// Records a hit for `key`.
    ///
    /// Returns `Err(retry_after_secs)` once the key has used up its window.
    /// A limit of zero disables limiting.
    pub fn check(&self, key: &str) -> Result<(), u64> {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> Result<(), u64> {
        if self.limit == 0 {
            return Ok(());
        }

        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        let entry = windows.get_or_insert_mut(key.to_string(), || Window {
            started: now,
            count: 0,
        });

        if now.duration_since(entry.started) >= self.window {
            entry.started = now;
            entry.count = 0;
        }

        if entry.count >= self.limit {
            let remaining = self.window.saturating_sub(now.duration_since(entry.started));
            return Err(remaining.as_secs().max(1));
        }

        entry.count += 1;
        Ok(())
    }

    /// Forgets the counter for `key`.
    pub fn reset(&self, key: &str) {
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        windows.pop(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_limit() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let now = Instant::now();

        assert!(limiter.check_at("alice", now).is_ok());
        assert!(limiter.check_at("alice", now).is_ok());
        assert!(limiter.check_at("alice", now).is_ok());
        assert_eq!(limiter.check_at("alice", now), Err(60));
    }

    #[test]
    fn keys_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let now = Instant::now();

        assert!(limiter.check_at("alice", now).is_ok());
        assert!(limiter.check_at("bob", now).is_ok());
        assert!(limiter.check_at("alice", now).is_err());
    }

    #[test]
    fn window_resets() {
        let limiter = RateLimiter::new(1, Duration::from_secs(10));
        let now = Instant::now();

        assert!(limiter.check_at("alice", now).is_ok());
        assert_eq!(
            limiter.check_at("alice", now + Duration::from_secs(4)),
            Err(6)
        );
        assert!(limiter
            .check_at("alice", now + Duration::from_secs(10))
            .is_ok());
    }

    #[test]
    fn zero_limit_disables() {
        let limiter = RateLimiter::new(0, Duration::from_secs(10));
        for _ in 0..100 {
            assert!(limiter.check("anyone").is_ok());
        }
    }

    #[test]
    fn reset_clears_counter() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.check("alice").is_ok());
        limiter.reset("alice");
        assert!(limiter.check("alice").is_ok());
    }

    #[test]
    fn capacity_bounds_memory() {
        let limiter = RateLimiter::with_capacity(1, Duration::from_secs(60), 2);
        let now = Instant::now();
        assert!(limiter.check_at("a", now).is_ok());
        assert!(limiter.check_at("b", now).is_ok());
        assert!(limiter.check_at("c", now).is_ok());
        // "a" was evicted, so it starts a fresh window.
        assert!(limiter.check_at("a", now).is_ok());
    }
}

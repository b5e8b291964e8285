//! Attempt throttling for sensitive routes.
//!
//! Each key (caller address + route path) owns a fixed window. The first
//! attempt opens the window; attempts beyond `max_attempts` inside it are
//! refused until it elapses or the key is reset.

mod memory;
mod middleware;

pub use memory::MemoryStore;
pub use middleware::{throttle, RateLimitKey};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use chrono::Utc;

use crate::errors::AppError;

pub const HEADER_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const HEADER_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const HEADER_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_attempts: u32,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window: Duration::from_secs(15 * 60),
        }
    }
}

impl RateLimitConfig {
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        Self { max_attempts, window }
    }

    pub fn from_env() -> Result<Self, AppError> {
        let defaults = Self::default();

        let max_attempts = match std::env::var("LOGIN_RATE_LIMIT_MAX") {
            Ok(val) => val
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| AppError::configuration("LOGIN_RATE_LIMIT_MAX must be a positive integer"))?,
            Err(_) => defaults.max_attempts,
        };

        let window = match std::env::var("LOGIN_RATE_LIMIT_WINDOW_SECS") {
            Ok(val) => val
                .parse::<u64>()
                .ok()
                .filter(|n| *n > 0)
                .map(Duration::from_secs)
                .ok_or_else(|| AppError::configuration("LOGIN_RATE_LIMIT_WINDOW_SECS must be a positive integer"))?,
            Err(_) => defaults.window,
        };

        Ok(Self { max_attempts, window })
    }
}

/// Counter state of one key after an attempt was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowState {
    pub count: u32,
    /// Epoch milliseconds at which the window closes.
    pub resets_at_ms: i64,
}

/// Backing storage for attempt counters.
///
/// `hit` must record the attempt and return the resulting window atomically
/// with respect to other callers on the same key.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn hit(&self, key: &str, now_ms: i64, window_ms: i64) -> WindowState;
    async fn reset(&self, key: &str);
    async fn tracked_keys(&self) -> usize;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Epoch seconds at which the current window closes.
    pub reset_at: i64,
    /// Seconds to wait before retrying; zero when allowed.
    pub retry_after: u64,
}

impl RateLimitDecision {
    pub fn write_headers(&self, headers: &mut HeaderMap) {
        headers.insert(HEADER_LIMIT, HeaderValue::from(self.limit));
        headers.insert(HEADER_REMAINING, HeaderValue::from(self.remaining));
        headers.insert(HEADER_RESET, HeaderValue::from(self.reset_at));
    }
}

pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    pub fn in_memory(config: RateLimitConfig) -> Self {
        Self::new(Arc::new(MemoryStore::new()), config)
    }

    pub async fn attempt(&self, key: &str) -> RateLimitDecision {
        self.attempt_at(key, Utc::now().timestamp_millis()).await
    }

    /// Records an attempt observed at `now_ms` (epoch milliseconds).
    pub async fn attempt_at(&self, key: &str, now_ms: i64) -> RateLimitDecision {
        let window_ms = i64::try_from(self.config.window.as_millis()).unwrap_or(i64::MAX);
        let state = self.store.hit(key, now_ms, window_ms).await;
        let limit = self.config.max_attempts;
        let allowed = state.count <= limit;

        let retry_after = if allowed {
            0
        } else {
            let wait_ms = (state.resets_at_ms - now_ms).max(0) as u64;
            wait_ms.div_ceil(1000).max(1)
        };

        RateLimitDecision {
            allowed,
            limit,
            remaining: limit.saturating_sub(state.count),
            reset_at: div_ceil_i64(state.resets_at_ms, 1000),
            retry_after,
        }
    }

    pub async fn reset(&self, key: &str) {
        self.store.reset(key).await;
    }

    pub async fn tracked_keys(&self) -> usize {
        self.store.tracked_keys().await
    }
}

fn div_ceil_i64(value: i64, divisor: i64) -> i64 {
    let quotient = value / divisor;
    if value % divisor > 0 {
        quotient + 1
    } else {
        quotient
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max: u32, window_ms: u64) -> RateLimiter {
        RateLimiter::in_memory(RateLimitConfig::new(max, Duration::from_millis(window_ms)))
    }

    #[tokio::test]
    async fn nth_plus_one_attempt_is_denied() {
        let limiter = limiter(3, 60_000);
        let now = 1_700_000_000_000;

        for expected_remaining in [2, 1, 0] {
            let decision = limiter.attempt_at("10.0.0.1:/auth/login", now).await;
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }

        let blocked = limiter.attempt_at("10.0.0.1:/auth/login", now + 1_000).await;
        assert!(!blocked.allowed);
        assert_eq!(blocked.retry_after, 59);
        assert_eq!(blocked.reset_at, (now + 60_000) / 1000);
    }

    #[tokio::test]
    async fn window_expiry_allows_again() {
        let limiter = limiter(1, 1_000);
        let now = 1_700_000_000_000;

        assert!(limiter.attempt_at("k", now).await.allowed);
        assert!(!limiter.attempt_at("k", now + 999).await.allowed);
        assert!(limiter.attempt_at("k", now + 1_000).await.allowed);
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let limiter = limiter(1, 60_000);
        assert!(limiter.attempt_at("a", 0).await.allowed);
        assert!(limiter.attempt_at("b", 0).await.allowed);
        assert!(!limiter.attempt_at("a", 1).await.allowed);
    }

    #[tokio::test]
    async fn reset_clears_the_counter() {
        let limiter = limiter(1, 60_000);
        assert!(limiter.attempt_at("k", 0).await.allowed);
        assert!(!limiter.attempt_at("k", 1).await.allowed);

        limiter.reset("k").await;
        assert!(limiter.attempt_at("k", 2).await.allowed);
    }

    #[tokio::test]
    async fn clock_going_backwards_degrades_to_allow() {
        let limiter = limiter(1, 60_000);
        let now = 1_700_000_000_000;
        assert!(limiter.attempt_at("k", now).await.allowed);
        assert!(!limiter.attempt_at("k", now + 10).await.allowed);

        // a window that appears to start in the future is discarded
        assert!(limiter.attempt_at("k", now - 5_000).await.allowed);
    }

    #[tokio::test]
    async fn threshold_two_with_real_sleep() {
        let limiter = limiter(2, 1_000);

        assert!(limiter.attempt("login").await.allowed);
        assert!(limiter.attempt("login").await.allowed);
        let blocked = limiter.attempt("login").await;
        assert!(!blocked.allowed);
        assert!(blocked.retry_after > 0);

        tokio::time::sleep(Duration::from_millis(1_100)).await;
        assert!(limiter.attempt("login").await.allowed);
    }

    #[test]
    fn headers_are_written() {
        let decision = RateLimitDecision {
            allowed: true,
            limit: 5,
            remaining: 4,
            reset_at: 1_700_000_900,
            retry_after: 0,
        };
        let mut headers = HeaderMap::new();
        decision.write_headers(&mut headers);

        assert_eq!(headers[HEADER_LIMIT], "5");
        assert_eq!(headers[HEADER_REMAINING], "4");
        assert_eq!(headers[HEADER_RESET], "1700000900");
    }
}

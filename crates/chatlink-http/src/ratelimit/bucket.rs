//! Per-bucket quota state

use std::time::Duration;

use tokio::time::Instant;

use super::headers::{deadline, RateLimitHeaders};

/// Quota state for one bucket
///
/// A bucket with no known limit always has capacity; the platform's headers
/// fill in the numbers after the first response.
#[derive(Debug, Clone)]
pub struct RateLimitBucket {
    key: String,
    limit: Option<u32>,
    remaining: Option<u32>,
    reset_at: Option<Instant>,
    /// Length of the last reported window, assumed for the next one
    window: Option<Duration>,
    last_used: Instant,
}

impl RateLimitBucket {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            limit: None,
            remaining: None,
            reset_at: None,
            window: None,
            last_used: Instant::now(),
        }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn limit(&self) -> Option<u32> {
        self.limit
    }

    #[must_use]
    pub fn remaining(&self) -> Option<u32> {
        self.remaining
    }

    #[must_use]
    pub fn reset_at(&self) -> Option<Instant> {
        self.reset_at
    }

    #[must_use]
    pub fn last_used(&self) -> Instant {
        self.last_used
    }

    /// Check if a request may be sent now
    #[must_use]
    pub fn has_capacity(&self, now: Instant) -> bool {
        match self.reset_at {
            Some(reset_at) if now < reset_at => self.remaining != Some(0),
            _ => true,
        }
    }

    /// Time left until the bucket has capacity again
    #[must_use]
    pub fn wait_time(&self, now: Instant) -> Option<Duration> {
        if self.has_capacity(now) {
            return None;
        }
        self.reset_at.map(|reset_at| reset_at - now)
    }

    /// Take one slot for a request about to be sent
    ///
    /// A bucket whose window has passed is refilled to `limit` and given a new
    /// window of the last reported length, until a response reports the real one.
    pub fn reserve(&mut self, now: Instant) {
        if self.reset_at.is_some_and(|reset_at| now >= reset_at) {
            self.remaining = self.limit;
            self.reset_at = self.window.map(|window| deadline(now, window));
        }
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining = remaining.saturating_sub(1);
        }
        self.last_used = now;
    }

    /// Take one slot if the bucket has capacity
    ///
    /// The check and the reservation happen under one borrow, so callers
    /// holding the bucket lock cannot overdraw it.
    pub fn try_reserve(&mut self, now: Instant) -> bool {
        if !self.has_capacity(now) {
            return false;
        }
        self.reserve(now);
        true
    }

    /// Apply the state reported by a response
    ///
    /// Responses to concurrent requests arrive in any order, so inside an
    /// unexpired window `remaining` only falls and `reset_at` only moves later.
    pub fn update(&mut self, headers: &RateLimitHeaders, now: Instant) {
        let open_window = self.reset_at.is_some_and(|reset_at| now < reset_at);
        if let Some(limit) = headers.limit {
            self.limit = Some(limit);
        }
        if let Some(remaining) = headers.remaining {
            self.remaining = Some(match self.remaining {
                Some(current) if open_window => current.min(remaining),
                _ => remaining,
            });
        }
        if let Some(reset_after) = headers.reset_after {
            let reported = deadline(now, reset_after);
            self.reset_at = Some(match self.reset_at {
                Some(current) if open_window => current.max(reported),
                _ => reported,
            });
            self.window = Some(self.window.map_or(reset_after, |window| window.max(reset_after)));
        }
        self.last_used = now;
    }

    /// Exhaust the bucket for `wait` (after a 429)
    pub fn block_for(&mut self, now: Instant, wait: Duration) {
        let until = deadline(now, wait);
        self.remaining = Some(0);
        self.reset_at = Some(self.reset_at.map_or(until, |current| current.max(until)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::headers::MAX_RETRY_AFTER;

    fn headers(limit: u32, remaining: u32, reset_after: Duration) -> RateLimitHeaders {
        RateLimitHeaders {
            limit: Some(limit),
            remaining: Some(remaining),
            reset_after: Some(reset_after),
            ..RateLimitHeaders::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_bucket_has_capacity() {
        let bucket = RateLimitBucket::new("default");
        assert!(bucket.has_capacity(Instant::now()));
        assert_eq!(bucket.wait_time(Instant::now()), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_until_reset() {
        let now = Instant::now();
        let mut bucket = RateLimitBucket::new("abc:channels/1");
        bucket.update(&headers(5, 1, Duration::from_secs(2)), now);

        assert!(bucket.has_capacity(now));
        bucket.reserve(now);
        assert_eq!(bucket.remaining(), Some(0));
        assert!(!bucket.has_capacity(now));
        assert_eq!(bucket.wait_time(now), Some(Duration::from_secs(2)));

        let later = now + Duration::from_secs(2);
        assert!(bucket.has_capacity(later));
        bucket.reserve(later);
        assert_eq!(bucket.remaining(), Some(4));
        assert_eq!(bucket.reset_at(), Some(later + Duration::from_secs(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_block_until_extends_reset() {
        let now = Instant::now();
        let mut bucket = RateLimitBucket::new("abc");
        bucket.update(&headers(5, 3, Duration::from_secs(10)), now);

        bucket.block_for(now, Duration::from_secs(1));
        assert_eq!(bucket.reset_at(), Some(now + Duration::from_secs(10)));
        assert!(!bucket.has_capacity(now + Duration::from_secs(5)));

        bucket.block_for(now, Duration::from_secs(30));
        assert_eq!(bucket.wait_time(now), Some(Duration::from_secs(30)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_try_reserve_stops_at_zero() {
        let now = Instant::now();
        let mut bucket = RateLimitBucket::new("abc:channels/1");
        bucket.update(&headers(2, 1, Duration::from_secs(5)), now);

        assert!(bucket.try_reserve(now));
        assert!(!bucket.try_reserve(now));
        assert_eq!(bucket.remaining(), Some(0));

        // Refilled window keeps the reported length
        let reset = now + Duration::from_secs(5);
        assert!(bucket.try_reserve(reset));
        assert!(bucket.try_reserve(reset));
        assert!(!bucket.try_reserve(reset + Duration::from_secs(4)));
        assert!(bucket.try_reserve(reset + Duration::from_secs(5)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_response_does_not_refill() {
        let now = Instant::now();
        let mut bucket = RateLimitBucket::new("abc:channels/1");
        bucket.update(&headers(5, 4, Duration::from_secs(2)), now);
        for _ in 0..4 {
            assert!(bucket.try_reserve(now));
        }

        // Replies to the four requests, the earliest one last
        let later = now + Duration::from_millis(100);
        for remaining in [2, 1, 0, 3] {
            bucket.update(&headers(5, remaining, Duration::from_millis(1900)), later);
        }
        assert_eq!(bucket.remaining(), Some(0));
        assert_eq!(bucket.reset_at(), Some(now + Duration::from_secs(2)));
        assert!(!bucket.has_capacity(later));
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_block_is_clamped() {
        let now = Instant::now();
        let mut bucket = RateLimitBucket::new("abc");
        bucket.block_for(now, Duration::MAX);
        assert_eq!(bucket.wait_time(now), Some(MAX_RETRY_AFTER));
    }
}

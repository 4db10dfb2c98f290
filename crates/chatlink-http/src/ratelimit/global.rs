//! Global rate limiter shared by every bucket
//!
//! Two gates: a proactive request quota, and a "blocked until" instant set
//! when the platform reports a global 429.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use parking_lot::Mutex;
use tokio::time::Instant;

use super::headers::deadline;

pub struct GlobalLimiter {
    quota: DefaultDirectRateLimiter,
    blocked_until: Mutex<Option<Instant>>,
}

impl std::fmt::Debug for GlobalLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalLimiter")
            .field("blocked_until", &*self.blocked_until.lock())
            .finish_non_exhaustive()
    }
}

impl GlobalLimiter {
    /// Create a limiter allowing `per_second` requests (minimum 1)
    pub fn new(per_second: u32) -> Self {
        let per_second = NonZeroU32::new(per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            quota: RateLimiter::direct(Quota::per_second(per_second)),
            blocked_until: Mutex::new(None),
        }
    }

    /// Block every bucket for `duration`
    pub fn block_for(&self, duration: Duration) {
        let until = deadline(Instant::now(), duration);
        let mut blocked = self.blocked_until.lock();
        *blocked = Some(blocked.map_or(until, |current| current.max(until)));
    }

    /// Time left on a server-declared global block
    #[must_use]
    pub fn blocked_for(&self, now: Instant) -> Option<Duration> {
        let mut blocked = self.blocked_until.lock();
        match *blocked {
            Some(until) if now < until => Some(until - now),
            Some(_) => {
                *blocked = None;
                None
            }
            None => None,
        }
    }

    #[must_use]
    pub fn is_blocked(&self, now: Instant) -> bool {
        self.blocked_for(now).is_some()
    }

    /// Wait for a slot in the proactive quota
    pub async fn acquire(&self) {
        self.quota.until_ready().await;
    }
}

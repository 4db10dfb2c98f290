//! Rate-limit metadata carried by response headers

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::header::HeaderMap;
use serde::Deserialize;
use tokio::time::Instant;

pub const LIMIT: &str = "x-ratelimit-limit";
pub const REMAINING: &str = "x-ratelimit-remaining";
pub const RESET: &str = "x-ratelimit-reset";
pub const RESET_AFTER: &str = "x-ratelimit-reset-after";
pub const BUCKET: &str = "x-ratelimit-bucket";
pub const GLOBAL: &str = "x-ratelimit-global";
pub const SCOPE: &str = "x-ratelimit-scope";
pub const RETRY_AFTER: &str = "retry-after";

/// Upper bound on any server-supplied wait
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Convert server-supplied seconds, rejecting negatives and clamping large values
fn clamped_seconds(secs: f64) -> Option<Duration> {
    if secs.is_nan() || secs < 0.0 {
        return None;
    }
    Some(Duration::try_from_secs_f64(secs).map_or(MAX_RETRY_AFTER, |d| d.min(MAX_RETRY_AFTER)))
}

/// `now + wait`, with `wait` capped at [`MAX_RETRY_AFTER`]
pub(crate) fn deadline(now: Instant, wait: Duration) -> Instant {
    now.checked_add(wait.min(MAX_RETRY_AFTER)).unwrap_or(now)
}

/// Parsed `x-ratelimit-*` headers
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateLimitHeaders {
    pub limit: Option<u32>,
    pub remaining: Option<u32>,
    /// Time until the bucket refills, from `reset-after` or `reset`
    pub reset_after: Option<Duration>,
    pub bucket: Option<String>,
    pub global: bool,
    /// `user`, `global` or `shared`
    pub scope: Option<String>,
    pub retry_after: Option<Duration>,
}

/// Body of a 429 response
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitedBody {
    /// Seconds, possibly fractional
    pub retry_after: f64,
    #[serde(default)]
    pub global: bool,
}

impl RateLimitHeaders {
    pub fn parse(headers: &HeaderMap) -> Self {
        let text = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim);
        let seconds = |name: &str| {
            text(name)
                .and_then(|v| v.parse::<f64>().ok())
                .and_then(clamped_seconds)
        };

        let reset_after = seconds(RESET_AFTER).or_else(|| {
            let reset_at = text(RESET)?.parse::<f64>().ok()?;
            let now = SystemTime::now().duration_since(UNIX_EPOCH).ok()?.as_secs_f64();
            clamped_seconds((reset_at - now).max(0.0))
        });

        Self {
            limit: text(LIMIT).and_then(|v| v.parse().ok()),
            remaining: text(REMAINING).and_then(|v| v.parse().ok()),
            reset_after,
            bucket: text(BUCKET).map(String::from),
            global: text(GLOBAL).is_some_and(|v| v.eq_ignore_ascii_case("true")),
            scope: text(SCOPE).map(String::from),
            retry_after: seconds(RETRY_AFTER),
        }
    }

    /// Check if the headers carry any bucket state
    #[must_use]
    pub fn has_bucket_state(&self) -> bool {
        self.limit.is_some() || self.remaining.is_some() || self.reset_after.is_some()
    }
}

impl RateLimitedBody {
    /// Parse a 429 body; the platform sends `retry_after` in seconds
    pub fn parse(body: &[u8]) -> Option<Self> {
        serde_json::from_slice(body).ok()
    }

    /// Wait requested by the body, at most [`MAX_RETRY_AFTER`]
    #[must_use]
    pub fn retry_after(&self) -> Duration {
        clamped_seconds(self.retry_after).unwrap_or(Duration::ZERO)
    }
}

//! Exponential backoff with jitter
//!
//! Shared by gateway reconnects and REST retries.

use rand::Rng;
use std::time::Duration;

/// Backoff calculator
///
/// Delay for attempt `n` (starting at 0) is `base * 2^n`, capped at `max`,
/// with up to ±`jitter` of the capped value added.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    jitter: f64,
    attempt: u32,
}

impl Backoff {
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            jitter: 0.2,
            attempt: 0,
        }
    }

    /// Set the jitter factor (clamped to 0..=1)
    #[must_use]
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Number of delays handed out since the last reset
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay before the next attempt
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.delay_for(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let base_ms = self.base.as_millis() as f64;
        let capped = (base_ms * 2f64.powi(attempt.min(31) as i32)).min(self.max.as_millis() as f64);

        let spread = capped * self.jitter;
        let jitter = if spread > 0.0 {
            rand::thread_rng().gen_range(-spread..=spread)
        } else {
            0.0
        };
        Duration::from_millis((capped + jitter).max(0.0) as u64)
    }
}

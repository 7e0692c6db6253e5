//! Exponential reconnect backoff with additive jitter.

use std::time::Duration;

use rand::Rng;

/// Exclusive upper bound of the random jitter added to every delay.
pub const JITTER_MAX_MS: u64 = 250;

/// Retry delay policy.
///
/// `delay(k) = min(max, base * 2^(k-1)) + jitter`, jitter in `[0, 250)` ms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay of the first retry, in milliseconds.
    pub base_ms: u64,
    /// Cap on the exponential part, in milliseconds.
    pub max_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_ms: 1_000,
            max_ms: 30_000,
        }
    }
}

impl BackoffPolicy {
    /// Creates a policy.
    pub fn new(base_ms: u64, max_ms: u64) -> Self {
        Self { base_ms, max_ms }
    }

    /// Deterministic part of the delay for retry attempt `attempt` (1-based).
    ///
    /// Attempt 0 is treated as attempt 1.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.max(1) - 1;
        let factor = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
        let ms = self.base_ms.saturating_mul(factor).min(self.max_ms);
        Duration::from_millis(ms)
    }

    /// Random jitter in `[0, JITTER_MAX_MS)`.
    pub fn jitter(&self) -> Duration {
        Duration::from_millis(rand::thread_rng().gen_range(0..JITTER_MAX_MS))
    }

    /// Full delay for `attempt`, jitter included.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay(attempt) + self.jitter()
    }

    /// Deterministic delays for attempts `1..=attempts`.
    pub fn schedule(&self, attempts: u32) -> Vec<Duration> {
        (1..=attempts).map(|k| self.base_delay(k)).collect()
    }
}

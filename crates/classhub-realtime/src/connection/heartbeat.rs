//! Client-side staleness detection for the live stream.
//!
//! The stream may die without the socket noticing. Instead of pings, the
//! monitor tracks the time since the last inbound frame and reports the
//! connection stale once it exceeds the configured timeout.

use std::time::Duration;

use tokio::time::Instant;

/// Upper bound on how often staleness is checked.
const MAX_CHECK_INTERVAL: Duration = Duration::from_millis(15_000);

/// Heartbeat configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatMonitor {
    /// Silence longer than this forces a reconnect.
    pub timeout: Duration,
}

impl Default for HeartbeatMonitor {
    fn default() -> Self {
        Self::new(Duration::from_millis(60_000))
    }
}

impl HeartbeatMonitor {
    /// Creates a monitor with the given timeout.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// `min(15s, timeout / 2)`, never zero.
    pub fn check_interval(&self) -> Duration {
        (self.timeout / 2)
            .min(MAX_CHECK_INTERVAL)
            .max(Duration::from_millis(1))
    }

    /// Returns the silence duration when it exceeds the timeout.
    pub fn stale_for(&self, last_frame: Instant, now: Instant) -> Option<Duration> {
        let silent = now.saturating_duration_since(last_frame);
        (silent > self.timeout).then_some(silent)
    }
}

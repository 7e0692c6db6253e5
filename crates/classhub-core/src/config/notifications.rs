//! Notification store configuration.

use serde::{Deserialize, Serialize};

/// Settings for the client-side notification store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    /// Polling fallback interval in milliseconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Path of the JSON file holding persisted preferences.
    #[serde(default = "default_preferences_path")]
    pub preferences_path: String,
    /// Number of recently delivered server ids remembered by the poller.
    #[serde(default = "default_seen_window")]
    pub seen_window: usize,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            preferences_path: default_preferences_path(),
            seen_window: default_seen_window(),
        }
    }
}

fn default_poll_interval() -> u64 {
    30_000
}

fn default_preferences_path() -> String {
    "data/preferences.json".to_string()
}

fn default_seen_window() -> usize {
    512
}

//! Live notification stream configuration.

use serde::{Deserialize, Serialize};

/// Settings for the server-push notification stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Base stream URL. When absent, a same-origin path is derived from
    /// `api.base_url`.
    #[serde(default)]
    pub url: Option<String>,
    /// Consecutive failures tolerated before the transport gives up.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// First reconnect delay in milliseconds.
    #[serde(default = "default_base_backoff")]
    pub base_backoff_ms: u64,
    /// Upper bound for the reconnect delay in milliseconds.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
    /// Silence longer than this forces a reconnect.
    #[serde(default = "default_heartbeat_timeout")]
    pub heartbeat_timeout_ms: u64,
    /// Append the token as a trailing path segment (`.../stream/{token}`).
    #[serde(default = "default_true")]
    pub embed_token_in_path: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_retries: default_max_retries(),
            base_backoff_ms: default_base_backoff(),
            max_backoff_ms: default_max_backoff(),
            heartbeat_timeout_ms: default_heartbeat_timeout(),
            embed_token_in_path: true,
        }
    }
}

fn default_max_retries() -> u32 {
    5
}

fn default_base_backoff() -> u64 {
    1_000
}

fn default_max_backoff() -> u64 {
    30_000
}

fn default_heartbeat_timeout() -> u64 {
    60_000
}

fn default_true() -> bool {
    true
}

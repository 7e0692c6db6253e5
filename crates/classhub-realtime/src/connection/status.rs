//! Connection status snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// States of the transport state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Not connected and not trying.
    #[default]
    Idle,
    /// First connection attempt in flight.
    Connecting,
    /// Stream open.
    Connected,
    /// Waiting for, or performing, a retry.
    Reconnecting,
    /// Retry budget exhausted; terminal until the next `connect`.
    Failed,
}

impl ConnectionState {
    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only view of the transport's connection health.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConnectionStatus {
    /// Current state.
    pub state: ConnectionState,
    /// Consecutive retry attempts since the last successful open.
    pub retry_attempt: u32,
    /// When the last frame (open, named event or default message) arrived.
    pub last_message_at: Option<DateTime<Utc>>,
}

impl ConnectionStatus {
    /// True iff the state is `connected`.
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

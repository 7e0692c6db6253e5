//! Lifecycle events emitted by the stream transport.

use std::fmt;
use std::str::FromStr;

use classhub_core::error::AppError;
use classhub_core::types::Diagnostic;

use crate::connection::status::ConnectionStatus;
use crate::message::sse::SseFrame;

/// Events delivered to transport subscribers.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A connection was established.
    Open,
    /// A transport-level failure; the reconnect state machine follows.
    Error(AppError),
    /// The stream ended. `terminal` is set when no further retry is scheduled.
    Close {
        /// Retry budget exhausted.
        terminal: bool,
    },
    /// A parsed notification payload (always a JSON object).
    Notification(serde_json::Value),
    /// State machine transition.
    Status(ConnectionStatus),
    /// Every inbound frame, before parsing.
    Raw(SseFrame),
    /// A contained failure.
    Log(Diagnostic),
}

impl TransportEvent {
    /// The subscription key this event is delivered under.
    pub fn kind(&self) -> TransportEventKind {
        match self {
            Self::Open => TransportEventKind::Open,
            Self::Error(_) => TransportEventKind::Error,
            Self::Close { .. } => TransportEventKind::Close,
            Self::Notification(_) => TransportEventKind::Notification,
            Self::Status(_) => TransportEventKind::Status,
            Self::Raw(_) => TransportEventKind::Raw,
            Self::Log(_) => TransportEventKind::Log,
        }
    }
}

/// Subscription keys for [`TransportEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportEventKind {
    /// `open`
    Open,
    /// `error`
    Error,
    /// `close`
    Close,
    /// `notification`
    Notification,
    /// `status`
    Status,
    /// `raw`
    Raw,
    /// `log`
    Log,
}

impl TransportEventKind {
    /// Event name as used by subscribers.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Error => "error",
            Self::Close => "close",
            Self::Notification => "notification",
            Self::Status => "status",
            Self::Raw => "raw",
            Self::Log => "log",
        }
    }
}

impl fmt::Display for TransportEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportEventKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "error" => Ok(Self::Error),
            "close" => Ok(Self::Close),
            "notification" => Ok(Self::Notification),
            "status" => Ok(Self::Status),
            "raw" => Ok(Self::Raw),
            "log" => Ok(Self::Log),
            other => Err(AppError::validation(format!("Unknown transport event: '{other}'"))),
        }
    }
}

/// Parses the body of a `notification` or default `message` frame.
///
/// Only JSON objects are accepted; anything else is a protocol error.
pub fn parse_notification(frame: &SseFrame) -> Result<serde_json::Value, AppError> {
    let value: serde_json::Value = serde_json::from_str(&frame.data)?;
    if value.is_object() {
        Ok(value)
    } else {
        Err(AppError::protocol(format!(
            "Notification payload must be a JSON object, got: {}",
            truncate(&frame.data, 80)
        )))
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max).collect();
        format!("{head}…")
    }
}

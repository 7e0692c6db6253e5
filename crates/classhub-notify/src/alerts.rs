//! Desktop and sound side channel for live notifications.
//!
//! Alerts are an enhancement: every failure here is swallowed by the store.

use std::io::Write;

use async_trait::async_trait;
use tracing::info;

use classhub_core::result::AppResult;

use crate::record::NotificationRecord;

/// Which sound to play.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundKind {
    /// Regular notification chime.
    Notification,
    /// Error tone.
    Error,
}

impl SoundKind {
    /// Sound for a record of type `kind`.
    pub fn for_type(kind: &str) -> Self {
        if kind == "error" { Self::Error } else { Self::Notification }
    }

    /// Return the sound as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Notification => "notification",
            Self::Error => "error",
        }
    }
}

/// Platform hooks for desktop notifications and sounds.
#[async_trait]
pub trait AlertSink: Send + Sync + std::fmt::Debug + 'static {
    /// Ask the platform for permission to show desktop notifications.
    async fn request_permission(&self) -> AppResult<bool>;

    /// Raise a desktop notification.
    async fn show_desktop(&self, record: &NotificationRecord) -> AppResult<()>;

    /// Play a sound.
    async fn play_sound(&self, sound: SoundKind) -> AppResult<()>;
}

/// Sink that only writes log lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn request_permission(&self) -> AppResult<bool> {
        Ok(true)
    }

    async fn show_desktop(&self, record: &NotificationRecord) -> AppResult<()> {
        info!(id = %record.id, kind = %record.kind, title = %record.title, "Desktop notification");
        Ok(())
    }

    async fn play_sound(&self, sound: SoundKind) -> AppResult<()> {
        info!(sound = sound.as_str(), "Sound");
        Ok(())
    }
}

/// Sink for interactive terminals: prints a banner and rings the bell.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalAlertSink;

#[async_trait]
impl AlertSink for TerminalAlertSink {
    async fn request_permission(&self) -> AppResult<bool> {
        Ok(true)
    }

    async fn show_desktop(&self, record: &NotificationRecord) -> AppResult<()> {
        let mut out = std::io::stderr().lock();
        writeln!(out, "\u{1b}[1m[{}]\u{1b}[0m {}", record.title, record.message)?;
        Ok(())
    }

    async fn play_sound(&self, sound: SoundKind) -> AppResult<()> {
        let mut out = std::io::stderr().lock();
        let bells = match sound {
            SoundKind::Notification => "\u{7}",
            SoundKind::Error => "\u{7}\u{7}",
        };
        out.write_all(bells.as_bytes())?;
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sound_keyed_by_type() {
        assert_eq!(SoundKind::for_type("error"), SoundKind::Error);
        assert_eq!(SoundKind::for_type("warning"), SoundKind::Notification);
        assert_eq!(SoundKind::for_type("grade"), SoundKind::Notification);
    }
}

//! Events published by the store.

use classhub_core::types::Diagnostic;

use crate::record::NotificationRecord;

/// Capacity of the store's broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Store state changes, delivered to every subscriber.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    /// A record entered the visible stack.
    ToastShown(NotificationRecord),
    /// A record left the stack through `dismiss` or its timer.
    ToastDismissed {
        /// Record id.
        id: String,
    },
    /// A record was pushed out by a newer one.
    ToastEvicted {
        /// Record id.
        id: String,
    },
    /// `clear_all` emptied the stack.
    Cleared,
    /// The stream failed and polling took over.
    PollingStarted,
    /// Polling stopped (stream reconnected or session ended).
    PollingStopped,
    /// The REST collaborator rejected the session token.
    SessionExpired,
    /// A swallowed failure.
    Diagnostic(Diagnostic),
}

impl StoreEvent {
    /// Short name, for logs and CLI output.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ToastShown(_) => "toast_shown",
            Self::ToastDismissed { .. } => "toast_dismissed",
            Self::ToastEvicted { .. } => "toast_evicted",
            Self::Cleared => "cleared",
            Self::PollingStarted => "polling_started",
            Self::PollingStopped => "polling_stopped",
            Self::SessionExpired => "session_expired",
            Self::Diagnostic(_) => "diagnostic",
        }
    }
}

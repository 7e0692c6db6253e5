//! # classhub-notify
//!
//! Client-side notification store for ClassHub. Provides:
//!
//! - Normalization of live, polled and local payloads into one record shape
//! - A bounded toast stack with FIFO eviction and per-record dismiss timers
//! - A polling fallback that takes over when the live stream gives up
//! - Persisted display preferences
//! - Desktop and sound alerts for live notifications

pub mod alerts;
pub mod api;
pub mod dedup;
pub mod events;
pub mod preferences;
pub mod record;
pub mod store;

pub use alerts::{AlertSink, LogAlertSink, SoundKind, TerminalAlertSink};
pub use api::{HttpNotificationApi, NotificationApi};
pub use events::StoreEvent;
pub use preferences::{
    FilePreferenceStorage, MemoryPreferenceStorage, PreferenceStorage, Preferences,
};
pub use record::{NotificationRecord, Source};
pub use store::{NotificationStore, StoreSettings};

//! # classhub-realtime
//!
//! Live notification stream client for ClassHub. Provides:
//!
//! - A server-sent-events frame codec tolerant of arbitrary chunking
//! - A pluggable stream connector (HTTP via reqwest, or scripted in tests)
//! - The connection state machine: `idle → connecting → connected ⇄
//!   reconnecting → failed`, with exponential backoff plus jitter
//! - Heartbeat staleness detection that forces a reconnect on silence
//! - Fan-out of typed lifecycle events to registered handlers

pub mod connection;
pub mod events;
pub mod message;
pub mod transport;

pub use connection::connector::{FrameStream, HttpSseConnector, StreamConnector};
pub use connection::status::{ConnectionState, ConnectionStatus};
pub use events::{EventBus, HandlerId};
pub use message::sse::SseFrame;
pub use message::types::{TransportEvent, TransportEventKind};
pub use transport::{ConnectOptions, StreamTransport};

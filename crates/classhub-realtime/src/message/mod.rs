//! Wire framing and transport event definitions.

pub mod sse;
pub mod types;

pub use sse::{SseDecoder, SseFrame};
pub use types::{TransportEvent, TransportEventKind};

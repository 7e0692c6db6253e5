//! Connection state, retry policy, liveness checking and stream opening.

pub mod backoff;
pub mod connector;
pub mod heartbeat;
pub mod status;
pub mod target;

pub use backoff::BackoffPolicy;
pub use heartbeat::HeartbeatMonitor;
pub use status::{ConnectionState, ConnectionStatus};
pub use target::StreamTarget;

//! Application layer for clipsync-relay.
//!
//! Transport-agnostic relay logic:
//!
//! - [`Connection`]: one peer, its outbound queue and one-shot teardown.
//! - [`ConnectionRegistry`]: live membership and clipboard fan-out.
//! - [`HeartbeatMonitor`]: ping timer and pong deadline per connection.

pub mod connection;
pub mod heartbeat;
pub mod registry;

pub use connection::{
    Connection, ConnectionError, ConnectionSettings, ConnectionState, OutboundFrame,
};
pub use heartbeat::{HeartbeatMonitor, PING_PAYLOAD};
pub use registry::{BroadcastReport, ConnectionRegistry, RegistryError};

//! Domain layer for clipsync-relay.
//!
//! Pure types with no dependency on sockets, tasks or files:
//!
//! - [`RelayConfig`] / [`HeartbeatConfig`]: every runtime setting and the
//!   rules that make a configuration valid.
//! - [`HeartbeatState`]: the per-connection `Alive → AwaitingPong → Dead`
//!   state machine, driven by explicit timestamps so it is testable without a
//!   clock.

pub mod config;
pub mod liveness;

pub use config::{ConfigError, HeartbeatConfig, RelayConfig};
pub use liveness::{HeartbeatState, Liveness};

//! Infrastructure layer for clipsync-relay.
//!
//! Everything that touches the outside world lives here.
//!
//! # Responsibilities
//!
//! - Binding the TCP listener and performing the WebSocket upgrade
//! - Pumping each connection's outbound queue into its WebSocket sink
//! - Reading inbound frames and handing clipboard text to the registry
//! - Loading the optional TOML configuration file
//!
//! # What does NOT belong here?
//!
//! - Membership, fan-out and heartbeat rules (application layer)
//! - Configuration validation (domain layer)

pub mod config_file;
pub mod ws_server;

pub use config_file::{load_config_file, ConfigFileError, RelayFileConfig};
pub use ws_server::{run_server, RelayError, RelayServer, SessionEnd};

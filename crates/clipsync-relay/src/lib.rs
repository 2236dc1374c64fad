//! clipsync-relay library crate.
//!
//! The relay accepts long-lived WebSocket connections from clipsync clients
//! and forwards every clipboard update it receives to all *other* connected
//! clients.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! clipsync-client (text frames over WebSocket)
//!         ↕
//! [clipsync-relay]
//!   ├── domain/           Pure types: RelayConfig, heartbeat liveness state
//!   ├── application/      Connection, ConnectionRegistry, HeartbeatMonitor
//!   └── infrastructure/
//!         ├── ws_server/    Accept loop, handshake, per-session read/write pumps
//!         └── config_file/  TOML configuration overlay
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O, no async and no frameworks.
//! - `application` is transport-agnostic: a [`application::Connection`] only
//!   sees a queue of outbound frames and a cancellation token, so the registry
//!   and heartbeat logic are tested without sockets.
//! - `infrastructure` owns the sockets: it pumps the outbound queue into a
//!   WebSocket sink and feeds inbound frames to the registry.

/// Domain layer: configuration and the heartbeat state machine.
pub mod domain;

/// Application layer: connections, registry fan-out, heartbeat timer.
pub mod application;

/// Infrastructure layer: WebSocket server and configuration file.
pub mod infrastructure;

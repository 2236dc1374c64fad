//! clipsync-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! The client is the per-machine half of clipsync.  It:
//!
//! 1. Watches the local clipboard through a
//!    [`ClipboardBridge`](application::ClipboardBridge).
//! 2. Sends every new clipboard text to the relay as one WebSocket text
//!    frame.
//! 3. Writes every text frame received from the relay into the local
//!    clipboard, taking care not to send that write back (echo suppression).
//! 4. Reconnects after a fixed pause whenever the relay goes away.

/// Domain layer: client configuration.
pub mod domain;

/// Application layer: clipboard bridge trait and sync rules.
pub mod application;

/// Infrastructure layer: clipboard backends and relay connection.
pub mod infrastructure;

//! Infrastructure layer for the client application.
//!
//! **Dependency rule**: this layer may depend on `application`, `domain` and
//! `clipsync_core`, but MUST NOT be imported by them.
//!
//! # Sub-modules
//!
//! - **`clipboard`** – [`ClipboardBridge`](crate::application::ClipboardBridge)
//!   backends: an in-memory clipboard and a stdin/stdout line clipboard.
//!
//! - **`network`** – WebSocket connection to the relay, the per-connection
//!   sync loop, and the reconnect loop.

pub mod clipboard;
pub mod network;

pub use network::{run_client, ClientError, ClientSession, RelayClient, SessionEnd};

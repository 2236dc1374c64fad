//! # clipsync-core
//!
//! Shared library for clipsync containing the clipboard event model, the
//! text-frame rules both ends of a connection agree on, and the default relay
//! endpoint.
//!
//! This crate is used by both the relay and the client.  It has zero
//! dependencies on sockets, async runtimes, or OS clipboard APIs.
//!
//! # Architecture overview
//!
//! clipsync keeps the clipboards of several machines in step.  Each machine
//! runs a *client* that watches the local clipboard and pushes new text to a
//! *relay*.  The relay fans every update out to all other connected clients,
//! which write it into their own clipboard.
//!
//! - **`domain`** – The values that travel through the relay: the
//!   [`ClipboardEvent`] and the opaque [`ConnectionId`] identifying its
//!   sender.
//!
//! - **`protocol`** – What a valid wire message is.  The payload is the raw
//!   clipboard text as a single UTF-8 WebSocket text frame, bounded by an
//!   explicit size limit, plus the default listen port and path.

pub mod domain;
pub mod protocol;

pub use domain::event::{ClipboardEvent, ConnectionId};
pub use protocol::endpoint::{relay_url, DEFAULT_PATH, DEFAULT_PORT};
pub use protocol::frame::{check_text_payload, ProtocolError, DEFAULT_MAX_TEXT_BYTES};

//! Wire rules shared by the relay and the client.
//!
//! The clipsync wire format is deliberately minimal: every application
//! message is a single WebSocket *text* frame whose payload is the raw
//! clipboard text.  There is no envelope, no message type and no sender id;
//! the relay's broadcast rule (never echo to the sender) stands in for the
//! missing sender field.
//!
//! - [`frame`] – size limit and validation of a text payload.
//! - [`endpoint`] – default listen port/path and relay URL construction.

pub mod endpoint;
pub mod frame;

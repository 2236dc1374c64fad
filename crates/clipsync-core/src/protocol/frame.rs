//! Text-frame validation.
//!
//! Clipboards can hold arbitrarily large text.  Rather than silently
//! truncating a large copy, clipsync enforces an explicit limit on the UTF-8
//! byte length of a clipboard payload:
//!
//! - The client checks before sending and reports [`ProtocolError::TooLarge`]
//!   to its caller instead of writing the frame.
//! - The relay checks every inbound frame and drops offenders (logging the
//!   error) without closing the connection.
//!
//! Non-text frames (binary) are never clipboard content and are reported as
//! [`ProtocolError::NonTextFrame`].

use thiserror::Error;

/// Default upper bound on a clipboard payload: 1 MiB of UTF-8.
pub const DEFAULT_MAX_TEXT_BYTES: usize = 1024 * 1024;

/// Errors describing a frame that is not a valid clipboard message.
///
/// A protocol error never terminates a connection by itself: the offending
/// frame is dropped and the connection keeps running.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// A frame of a kind other than text arrived (e.g. binary).
    #[error("unexpected {kind} frame ({len} bytes); only text frames carry clipboard data")]
    NonTextFrame { kind: &'static str, len: usize },

    /// The clipboard text exceeds the configured limit.
    #[error("clipboard text is {len} bytes, exceeding the {limit}-byte limit")]
    TooLarge { len: usize, limit: usize },
}

/// Checks that `text` fits within `limit` bytes.
///
/// Only the UTF-8 byte length matters; a 1 MiB limit admits fewer CJK
/// characters than ASCII ones.
///
/// # Errors
///
/// Returns [`ProtocolError::TooLarge`] if `text.len() > limit`.
///
/// # Examples
///
/// ```rust
/// use clipsync_core::{check_text_payload, ProtocolError};
///
/// assert!(check_text_payload("hello", 16).is_ok());
/// assert_eq!(
///     check_text_payload("hello", 4),
///     Err(ProtocolError::TooLarge { len: 5, limit: 4 })
/// );
/// ```
pub fn check_text_payload(text: &str, limit: usize) -> Result<(), ProtocolError> {
    let len = text.len();
    if len > limit {
        return Err(ProtocolError::TooLarge { len, limit });
    }
    Ok(())
}

/// Builds the error reported for a binary frame of `len` bytes.
pub fn binary_frame(len: usize) -> ProtocolError {
    ProtocolError::NonTextFrame {
        kind: "binary",
        len,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

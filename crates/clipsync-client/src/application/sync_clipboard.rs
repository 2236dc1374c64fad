//! SyncClipboardUseCase: decides what crosses the wire in each direction.
//!
//! The use case sits between the [`ClipboardBridge`] (local clipboard) and
//! the relay connection.  It does no I/O of its own beyond calling the
//! bridge, so the echo rules are tested with a mocked bridge.
//!
//! # Echo suppression
//!
//! Writing a remote update into the local clipboard makes the platform
//! watcher report a "change" with that same text.  Sending it back would
//! bounce the text between machines forever.  Two rules prevent that:
//!
//! 1. A local change equal to the text most recently *applied* from the
//!    relay is swallowed once.
//! 2. A local change equal to the text most recently *sent* is swallowed,
//!    unless a remote update has replaced the clipboard since then.

use std::sync::Arc;

use clipsync_core::{check_text_payload, ProtocolError};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

/// Errors reported by a clipboard backend.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BridgeError {
    /// The clipboard is not reachable (no display, permission denied...).
    #[error("clipboard unavailable: {0}")]
    Unavailable(String),

    /// Writing to the clipboard failed.
    #[error("failed to write clipboard: {0}")]
    Write(String),

    /// `watch` was called while a watcher is already running.
    #[error("clipboard is already being watched")]
    AlreadyWatching,
}

/// Platform-agnostic access to the local clipboard.
///
/// Each backend lives in the infrastructure layer.  Methods are synchronous;
/// backends that need background work spawn it in `watch`.
#[cfg_attr(test, mockall::automock)]
pub trait ClipboardBridge: Send + Sync {
    /// Starts watching the clipboard.  Every local change arrives as one
    /// `String` on the returned channel; the channel closes when the backend
    /// stops.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError`] if the clipboard cannot be watched.
    fn watch(&self) -> Result<mpsc::Receiver<String>, BridgeError>;

    /// Replaces the clipboard contents with `text`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError`] if the write fails.
    fn set_clipboard(&self, text: &str) -> Result<(), BridgeError>;

    /// Stops the watcher started by `watch`.
    fn stop(&self);
}

/// The Sync Clipboard use case.
pub struct SyncClipboardUseCase {
    bridge: Arc<dyn ClipboardBridge>,
    max_text_bytes: usize,
    last_applied: Option<String>,
    last_sent: Option<String>,
}

impl SyncClipboardUseCase {
    pub fn new(bridge: Arc<dyn ClipboardBridge>, max_text_bytes: usize) -> Self {
        Self {
            bridge,
            max_text_bytes,
            last_applied: None,
            last_sent: None,
        }
    }

    /// Filters a local clipboard change.
    ///
    /// Returns `Ok(Some(text))` if it should be sent to the relay, `Ok(None)`
    /// if it is an echo or a repeat.  The caller must send the returned text.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::TooLarge`] if the text exceeds the limit.
    pub fn outbound(&mut self, text: String) -> Result<Option<String>, ProtocolError> {
        if self.last_applied.as_deref() == Some(text.as_str()) {
            self.last_applied = None;
            debug!("suppressing echo of applied update ({} bytes)", text.len());
            return Ok(None);
        }
        if self.last_sent.as_deref() == Some(text.as_str()) {
            debug!("suppressing repeat of last sent text ({} bytes)", text.len());
            return Ok(None);
        }
        check_text_payload(&text, self.max_text_bytes)?;
        self.last_sent = Some(text.clone());
        Ok(Some(text))
    }

    /// Writes a remote update into the local clipboard.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError`] if the bridge rejects the write.
    pub fn apply_remote(&mut self, text: String) -> Result<(), BridgeError> {
        self.bridge.set_clipboard(&text)?;
        debug!("applied remote update ({} bytes)", text.len());
        // The clipboard no longer holds what we last sent; copying it again
        // is a real change.
        self.last_sent = None;
        self.last_applied = Some(text);
        Ok(())
    }

    /// Forgets what was sent on a previous connection, so the first local
    /// change after a reconnect always goes out.
    pub fn reset_session(&mut self) {
        self.last_sent = None;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

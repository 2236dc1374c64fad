//! Clipboard events and connection identities.
//!
//! A [`ClipboardEvent`] is created by the relay for every text frame it reads
//! from a connection.  It records *what* was copied, *who* sent it and *when*
//! it arrived, and is then handed to the connection registry for fan-out.
//!
//! Events are immutable once built: the registry clones the text for each
//! recipient, so one slow peer can never observe a change made for another.

use std::fmt;
use std::time::SystemTime;

use uuid::Uuid;

/// Opaque identity of one relay connection.
///
/// A fresh random UUID is assigned when the connection is constructed.  The
/// value carries no meaning beyond equality; it is used as the registry key
/// and as the `exclude` argument when broadcasting so a sender never receives
/// its own update back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generates a new random connection id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for ConnectionId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The short form keeps log lines readable; 8 hex digits are plenty to
        // tell concurrent connections apart.
        let simple = self.0.simple().to_string();
        f.write_str(&simple[..8])
    }
}

/// One clipboard update travelling through the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipboardEvent {
    /// The clipboard text, exactly as received (UTF-8).
    pub text: String,
    /// The connection the text arrived on.
    pub source: ConnectionId,
    /// Wall-clock time at which the relay read the frame.
    pub timestamp: SystemTime,
}

impl ClipboardEvent {
    /// Builds an event stamped with the current time.
    pub fn new(text: impl Into<String>, source: ConnectionId) -> Self {
        Self {
            text: text.into(),
            source,
            timestamp: SystemTime::now(),
        }
    }

    /// Size of the text payload in bytes, used in log lines instead of the
    /// text itself.
    pub fn len(&self) -> usize {
        self.text.len()
    }

    /// Returns `true` if the clipboard text is empty.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

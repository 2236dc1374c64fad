//! Application layer for the client: the clipboard bridge seam and the
//! sync rules.

pub mod sync_clipboard;

pub use sync_clipboard::{BridgeError, ClipboardBridge, SyncClipboardUseCase};

//! [`ClipboardBridge`](crate::application::ClipboardBridge) backends.
//!
//! OS clipboard backends are not part of this crate; the terminal backend
//! can be piped into platform tools instead.

pub mod memory;
pub mod terminal;

pub use memory::MemoryClipboard;
pub use terminal::TerminalClipboard;

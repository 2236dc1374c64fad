//! In-process clipboard.
//!
//! `MemoryClipboard` keeps the clipboard in a `Mutex<Option<String>>`.  It
//! behaves like a platform clipboard from the client's point of view:
//!
//! - [`MemoryClipboard::copy`] simulates the user copying text: it updates
//!   the contents and reports a change to the watcher.
//! - [`ClipboardBridge::set_clipboard`] updates the contents, records the
//!   write, and *also* reports a change, the way OS clipboard watchers fire
//!   on programmatic writes.  This exercises echo suppression.
//!
//! Useful for tests and for embedding the client in another program.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc::{self, error::TrySendError};

use crate::application::{BridgeError, ClipboardBridge};

/// Change events buffered before `copy` starts failing.
const CHANGE_CAPACITY: usize = 64;

#[derive(Default)]
pub struct MemoryClipboard {
    contents: Mutex<Option<String>>,
    applied: Mutex<Vec<String>>,
    watcher: Mutex<Option<mpsc::Sender<String>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current clipboard text.
    pub fn contents(&self) -> Option<String> {
        lock(&self.contents).clone()
    }

    /// Every text written through `set_clipboard`, oldest first.
    pub fn applied(&self) -> Vec<String> {
        lock(&self.applied).clone()
    }

    /// Simulates a local copy of `text`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Unavailable`] if nobody is watching or the
    /// watcher has fallen too far behind.
    pub fn copy(&self, text: impl Into<String>) -> Result<(), BridgeError> {
        let text = text.into();
        *lock(&self.contents) = Some(text.clone());
        self.notify(text)
    }

    fn notify(&self, text: String) -> Result<(), BridgeError> {
        let watcher = lock(&self.watcher);
        let Some(tx) = watcher.as_ref() else {
            return Err(BridgeError::Unavailable("clipboard is not being watched".into()));
        };
        tx.try_send(text).map_err(|e| match e {
            TrySendError::Full(_) => BridgeError::Unavailable("change queue is full".into()),
            TrySendError::Closed(_) => BridgeError::Unavailable("watcher was dropped".into()),
        })
    }
}

impl ClipboardBridge for MemoryClipboard {
    fn watch(&self) -> Result<mpsc::Receiver<String>, BridgeError> {
        let mut watcher = lock(&self.watcher);
        if watcher.as_ref().is_some_and(|tx| !tx.is_closed()) {
            return Err(BridgeError::AlreadyWatching);
        }
        let (tx, rx) = mpsc::channel(CHANGE_CAPACITY);
        *watcher = Some(tx);
        Ok(rx)
    }

    fn set_clipboard(&self, text: &str) -> Result<(), BridgeError> {
        *lock(&self.contents) = Some(text.to_string());
        lock(&self.applied).push(text.to_string());
        // Like an OS watcher, report our own write; ignore a missing watcher.
        let _ = self.notify(text.to_string());
        Ok(())
    }

    fn stop(&self) {
        lock(&self.watcher).take();
    }
}

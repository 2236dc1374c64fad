//! Line-oriented clipboard on stdin/stdout.
//!
//! Each line read from the input is one local clipboard change; each update
//! applied from the relay is written to the output as one line.  Pairs well
//! with shell tools (`wl-paste --watch`, `xclip -o`, `pbpaste`) on either end
//! of a pipe.

use std::io::Write;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::application::{BridgeError, ClipboardBridge};

const CHANGE_CAPACITY: usize = 64;

type Input = Box<dyn AsyncRead + Send + Unpin>;
type Output = Box<dyn Write + Send>;

pub struct TerminalClipboard {
    input: Mutex<Option<Input>>,
    output: Mutex<Output>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl TerminalClipboard {
    /// Uses the process's stdin and stdout.
    pub fn stdio() -> Self {
        Self::with_io(Box::new(tokio::io::stdin()), Box::new(std::io::stdout()))
    }

    pub fn with_io(input: Input, output: Output) -> Self {
        Self {
            input: Mutex::new(Some(input)),
            output: Mutex::new(output),
            reader: Mutex::new(None),
        }
    }
}

impl ClipboardBridge for TerminalClipboard {
    /// Spawns the line reader.  Must be called inside a tokio runtime.  The
    /// input can only be watched once; the channel closes at end of input.
    fn watch(&self) -> Result<mpsc::Receiver<String>, BridgeError> {
        let input = lock(&self.input)
            .take()
            .ok_or(BridgeError::AlreadyWatching)?;
        let (tx, rx) = mpsc::channel(CHANGE_CAPACITY);

        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(input).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) if line.is_empty() => continue,
                    Ok(Some(line)) => {
                        if tx.send(line).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!("clipboard input reached end of file");
                        break;
                    }
                    Err(e) => {
                        warn!("failed to read clipboard input: {e}");
                        break;
                    }
                }
            }
        });
        *lock(&self.reader) = Some(reader);
        Ok(rx)
    }

    fn set_clipboard(&self, text: &str) -> Result<(), BridgeError> {
        let mut output = lock(&self.output);
        writeln!(output, "{text}")
            .and_then(|()| output.flush())
            .map_err(|e| BridgeError::Write(e.to_string()))
    }

    fn stop(&self) {
        if let Some(reader) = lock(&self.reader).take() {
            reader.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    /// Output sink the test can read back.
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_each_nonempty_line_is_a_change() {
        // Arrange
        let input: &'static [u8] = b"first\n\nsecond line\n";
        let clipboard = TerminalClipboard::with_io(Box::new(input), Box::new(std::io::sink()));

        // Act
        let mut changes = clipboard.watch().unwrap();

        // Assert
        assert_eq!(changes.recv().await.as_deref(), Some("first"));
        assert_eq!(changes.recv().await.as_deref(), Some("second line"));
        assert_eq!(changes.recv().await, None);
    }

    #[tokio::test]
    async fn test_input_can_only_be_watched_once() {
        let input: &'static [u8] = b"";
        let clipboard = TerminalClipboard::with_io(Box::new(input), Box::new(std::io::sink()));
        let _changes = clipboard.watch().unwrap();
        assert_eq!(clipboard.watch().err(), Some(BridgeError::AlreadyWatching));
        clipboard.stop();
    }

    #[test]
    fn test_applied_update_is_printed_as_line() {
        let out = SharedBuf::default();
        let input: &'static [u8] = b"";
        let clipboard = TerminalClipboard::with_io(Box::new(input), Box::new(out.clone()));

        clipboard.set_clipboard("hello 世界").unwrap();

        assert_eq!(out.0.lock().unwrap().as_slice(), "hello 世界\n".as_bytes());
    }
}

//! Network infrastructure for the client.
//!
//! Architecture:
//! - [`RelayClient`] dials the relay (`connect_async`) under a timeout.
//! - A [`ClientSession`] owns one WebSocket connection.  Its `run` loop
//!   multiplexes local clipboard changes, inbound text frames and the
//!   shutdown token; it ends when the relay goes away.
//! - [`run_client`] is the reconnect loop used by the binary: one session
//!   at a time, a fixed pause between attempts.
//!
//! Heartbeat pings from the relay are answered by tungstenite itself while
//! the read side is being polled, which the session loop does continuously.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use clipsync_core::protocol::frame::binary_frame;
use clipsync_core::{check_text_payload, ProtocolError};

use crate::application::{BridgeError, ClipboardBridge, SyncClipboardUseCase};
use crate::domain::{ClientConfig, ConfigError};

/// Upper bound on the closing handshake when a session ends locally.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Errors that can occur in the client network layer.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The configuration failed validation.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The relay could not be reached or refused the upgrade.
    #[error("failed to connect to relay at {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: Box<WsError>,
    },

    /// The relay did not answer in time.
    #[error("connecting to relay at {url} timed out after {timeout:?}")]
    ConnectTimeout { url: String, timeout: Duration },

    /// The established connection failed.
    #[error("relay connection error: {0}")]
    Transport(#[source] Box<WsError>),

    /// The relay stopped accepting data.
    #[error("write to relay stalled for {timeout:?}")]
    WriteTimeout { timeout: Duration },

    /// Local clipboard text exceeds the size limit and was not sent.
    #[error("clipboard text is {len} bytes, exceeding the {limit}-byte limit")]
    TooLarge { len: usize, limit: usize },

    /// The relay sent something other than clipboard text.
    #[error(transparent)]
    Protocol(ProtocolError),

    /// The clipboard backend failed.
    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

impl From<ProtocolError> for ClientError {
    fn from(e: ProtocolError) -> Self {
        match e {
            ProtocolError::TooLarge { len, limit } => ClientError::TooLarge { len, limit },
            other => ClientError::Protocol(other),
        }
    }
}

/// Why a session ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The shutdown token fired.
    Shutdown,
    /// The relay closed the connection.
    RelayClosed,
    /// The clipboard backend stopped producing changes.
    ClipboardClosed,
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Dials the relay.
pub struct RelayClient {
    config: ClientConfig,
}

impl RelayClient {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Opens one WebSocket connection to the relay.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Connect`] if the TCP connect or upgrade fails
    /// and [`ClientError::ConnectTimeout`] if it takes too long.
    pub async fn connect(&self) -> Result<ClientSession, ClientError> {
        let url = &self.config.relay_url;
        match timeout(self.config.connect_timeout, connect_async(url.as_str())).await {
            Ok(Ok((ws, _response))) => {
                info!("connected to relay at {url}");
                Ok(ClientSession {
                    ws,
                    max_text_bytes: self.config.max_text_bytes,
                    write_timeout: self.config.write_timeout,
                })
            }
            Ok(Err(source)) => Err(ClientError::Connect {
                url: url.clone(),
                source: Box::new(source),
            }),
            Err(_) => Err(ClientError::ConnectTimeout {
                url: url.clone(),
                timeout: self.config.connect_timeout,
            }),
        }
    }
}

enum Step {
    Shutdown,
    Local(Option<String>),
    Remote(Option<Result<Message, WsError>>),
}

/// One live connection to the relay.
pub struct ClientSession {
    ws: WsStream,
    max_text_bytes: usize,
    write_timeout: Duration,
}

impl ClientSession {
    /// Sends `text` to the relay as a single text frame.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::TooLarge`] without sending if the text exceeds
    /// the limit, [`ClientError::Transport`] if the write fails and
    /// [`ClientError::WriteTimeout`] if it does not finish in time.
    pub async fn send_text(&mut self, text: String) -> Result<(), ClientError> {
        check_text_payload(&text, self.max_text_bytes)?;
        self.write(text).await
    }

    async fn write(&mut self, text: String) -> Result<(), ClientError> {
        let len = text.len();
        match timeout(self.write_timeout, self.ws.send(Message::Text(text))).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(ClientError::Transport(Box::new(e))),
            Err(_) => {
                return Err(ClientError::WriteTimeout {
                    timeout: self.write_timeout,
                })
            }
        }
        debug!("sent local clipboard change ({len} bytes)");
        Ok(())
    }

    /// Receives the next text frame from the relay, skipping control
    /// frames.  Returns `None` once the relay has closed the connection.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] if reading fails.
    pub async fn recv_text(&mut self) -> Result<Option<String>, ClientError> {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text)),
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue,
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => return Ok(None),
                Some(Err(e)) => return Err(ClientError::Transport(Box::new(e))),
            }
        }
    }

    /// Synchronises the clipboard with the relay until the connection ends.
    ///
    /// Local changes are filtered through `sync` and sent; inbound text is
    /// applied through `sync`.  A local change that is too large or a failed
    /// clipboard write is logged and skipped; it does not end the session.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] if the connection fails and
    /// [`ClientError::WriteTimeout`] if the relay stops reading.
    pub async fn run(
        mut self,
        changes: &mut mpsc::Receiver<String>,
        sync: &mut SyncClipboardUseCase,
        shutdown: &CancellationToken,
    ) -> Result<SessionEnd, ClientError> {
        sync.reset_session();
        loop {
            let step = tokio::select! {
                biased;
                _ = shutdown.cancelled() => Step::Shutdown,
                change = changes.recv() => Step::Local(change),
                inbound = self.ws.next() => Step::Remote(inbound),
            };

            match step {
                Step::Shutdown => {
                    self.close().await;
                    return Ok(SessionEnd::Shutdown);
                }
                Step::Local(None) => {
                    self.close().await;
                    return Ok(SessionEnd::ClipboardClosed);
                }
                Step::Local(Some(text)) => match sync.outbound(text) {
                    Ok(Some(text)) => self.write(text).await?,
                    Ok(None) => {}
                    Err(e) => warn!("local change not sent: {}", ClientError::from(e)),
                },
                Step::Remote(Some(Ok(Message::Text(text)))) => {
                    if let Err(e) = sync.apply_remote(text) {
                        warn!("remote update not applied: {e}");
                    }
                }
                Step::Remote(Some(Ok(Message::Binary(data)))) => {
                    warn!("{}; frame ignored", binary_frame(data.len()));
                }
                Step::Remote(Some(Ok(Message::Close(_))) | None) => {
                    return Ok(SessionEnd::RelayClosed);
                }
                Step::Remote(Some(Ok(_))) => {}
                Step::Remote(Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed))) => {
                    return Ok(SessionEnd::RelayClosed);
                }
                Step::Remote(Some(Err(e))) => return Err(ClientError::Transport(Box::new(e))),
            }
        }
    }

    /// Sends a Close frame and waits briefly for the relay to acknowledge.
    pub async fn close(mut self) {
        if timeout(CLOSE_TIMEOUT, self.ws.close(None)).await.is_err() {
            debug!("relay did not acknowledge close in time");
        }
    }
}

/// Keeps the local clipboard in sync with the relay until `shutdown` fires
/// or the clipboard backend stops.
///
/// Runs one session at a time.  When a session ends because the relay went
/// away (or could not be reached), waits `reconnect_interval` and dials
/// again.
///
/// # Errors
///
/// Returns an error only if the configuration is invalid or the clipboard
/// cannot be watched; connection failures are retried.
pub async fn run_client(
    config: ClientConfig,
    bridge: Arc<dyn ClipboardBridge>,
    shutdown: CancellationToken,
) -> Result<(), ClientError> {
    config.validate()?;
    let mut changes = bridge.watch()?;
    let mut sync = SyncClipboardUseCase::new(Arc::clone(&bridge), config.max_text_bytes);
    let reconnect_interval = config.reconnect_interval;
    let client = RelayClient::new(config);

    loop {
        let attempt = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            attempt = client.connect() => attempt,
        };
        match attempt {
            Ok(session) => match session.run(&mut changes, &mut sync, &shutdown).await {
                Ok(SessionEnd::Shutdown) => break,
                Ok(SessionEnd::ClipboardClosed) => {
                    info!("clipboard input closed; stopping");
                    break;
                }
                Ok(SessionEnd::RelayClosed) => warn!("relay closed the connection"),
                Err(e) => warn!("session ended: {e}"),
            },
            Err(e) => warn!("{e}"),
        }

        info!("reconnecting in {reconnect_interval:?}");
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(reconnect_interval) => {}
        }
    }

    bridge.stop();
    info!("clipsync client stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

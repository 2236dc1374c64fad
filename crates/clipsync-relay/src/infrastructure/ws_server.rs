//! WebSocket server: accept loop and per-session task management.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Upgrading each accepted socket to a WebSocket session, rejecting
//!    requests for any path other than the configured one with 404.
//! 3. Wiring each session to the application layer:
//!    - a [`Connection`] plus a **writer** task pumping its outbound queue
//!      into the WebSocket sink,
//!    - a [`HeartbeatMonitor`] task,
//!    - the **read loop**, which runs on the session task itself and turns
//!      every inbound text frame into a [`ClipboardEvent`] broadcast.
//! 4. Shutting down gracefully when the server's [`CancellationToken`] fires:
//!    stop accepting, close every registered connection, then give sessions
//!    a grace period before aborting them.
//!
//! One slow or dead peer never blocks another: every session has its own
//! tasks and every write carries a deadline.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use clipsync_core::protocol::frame::binary_frame;
use clipsync_core::{check_text_payload, ClipboardEvent};

use crate::application::{
    Connection, ConnectionError, ConnectionRegistry, HeartbeatMonitor, OutboundFrame,
    RegistryError,
};
use crate::domain::{ConfigError, Liveness, RelayConfig};

/// Pause after a failed `accept()` so a persistent error (e.g. out of file
/// descriptors) does not spin the loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Upper bound on sending the final Close frame to a peer.
const CLOSE_FRAME_TIMEOUT: Duration = Duration::from_millis(500);

/// Server-level failures.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The configuration failed validation.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The listener could not be bound.
    #[error("failed to bind WebSocket listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// A client's WebSocket upgrade failed (bad request, wrong path, I/O).
    #[error("WebSocket handshake with {peer} failed: {source}")]
    Handshake {
        peer: SocketAddr,
        #[source]
        source: Box<WsError>,
    },

    /// A client did not finish the upgrade in time.
    #[error("WebSocket handshake with {peer} timed out after {timeout:?}")]
    HandshakeTimeout { peer: SocketAddr, timeout: Duration },

    /// The registry refused the connection.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Why a session's read loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// The peer sent a Close frame.
    PeerClosed,
    /// The stream ended without a Close frame.
    StreamEnded,
    /// Reading from the transport failed.
    Transport(String),
    /// The peer stopped answering pings.
    HeartbeatTimeout,
    /// The connection was closed locally (writer failure or server shutdown).
    Closed,
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEnd::PeerClosed => f.write_str("peer closed the connection"),
            SessionEnd::StreamEnded => f.write_str("stream ended"),
            SessionEnd::Transport(reason) => write!(f, "transport error: {reason}"),
            SessionEnd::HeartbeatTimeout => f.write_str("heartbeat timeout"),
            SessionEnd::Closed => f.write_str("closed by relay"),
        }
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// A bound, not yet serving, relay.
///
/// Splitting `bind` from `serve` lets callers bind port 0 and read the real
/// address back, and hand the registry to whoever needs to observe it.
pub struct RelayServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    config: Arc<RelayConfig>,
    registry: Arc<ConnectionRegistry>,
}

impl RelayServer {
    /// Validates `config` and binds the listener.
    ///
    /// # Errors
    ///
    /// - [`RelayError::Config`] if the configuration is invalid.
    /// - [`RelayError::Bind`] if the address is unavailable.
    pub async fn bind(config: RelayConfig) -> Result<Self, RelayError> {
        config.validate()?;
        let addr = config.listen_addr;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| RelayError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| RelayError::Bind { addr, source })?;

        info!("clipsync relay listening on ws://{local_addr}{}", config.path);

        Ok(Self {
            listener,
            local_addr,
            registry: Arc::new(ConnectionRegistry::new(config.max_connections)),
            config: Arc::new(config),
        })
    }

    /// The address the listener is actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The registry shared by every session of this server.
    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Accepts connections until `shutdown` is cancelled.
    ///
    /// On shutdown the listener is dropped first, then every registered
    /// connection is closed, then session tasks get `shutdown_grace` to
    /// finish before they are aborted.  Returns once all of them are gone.
    pub async fn serve(self, shutdown: CancellationToken) {
        let RelayServer {
            listener,
            config,
            registry,
            ..
        } = self;
        let mut sessions = JoinSet::new();

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("shutdown requested; no longer accepting connections");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer_addr)) => {
                        debug!("accepted TCP connection from {peer_addr}");
                        sessions.spawn(handle_session(
                            stream,
                            peer_addr,
                            Arc::clone(&config),
                            Arc::clone(&registry),
                        ));
                    }
                    Err(e) => {
                        error!("accept error: {e}");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
                Some(finished) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(e) = finished {
                        if e.is_panic() {
                            error!("session task panicked: {e}");
                        }
                    }
                }
            }
        }

        drop(listener);
        let closed = registry.shutdown();
        debug!("closed {closed} registered connection(s)");

        let grace = config.shutdown_grace;
        let drained = timeout(grace, async {
            while sessions.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(
                "{} session(s) still running after {grace:?}; aborting",
                sessions.len()
            );
            sessions.shutdown().await;
        }

        info!("clipsync relay stopped");
    }
}

/// Binds and serves a relay until `shutdown` is cancelled.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the listener cannot
/// be bound.
pub async fn run_server(config: RelayConfig, shutdown: CancellationToken) -> Result<(), RelayError> {
    let server = RelayServer::bind(config).await?;
    server.serve(shutdown).await;
    Ok(())
}

// ── Per-session handler ───────────────────────────────────────────────────────

/// Entry point of each session task: runs [`run_session`] and logs how it
/// ended.
async fn handle_session(
    stream: TcpStream,
    peer_addr: SocketAddr,
    config: Arc<RelayConfig>,
    registry: Arc<ConnectionRegistry>,
) {
    match run_session(stream, peer_addr, &config, &registry).await {
        Ok(end) => info!("session {peer_addr} ended: {end}"),
        Err(RelayError::Registry(e)) => warn!("session {peer_addr} rejected: {e}"),
        Err(e) => warn!("session {peer_addr} failed: {e}"),
    }
}

/// Runs the complete lifecycle of one client connection.
///
/// Upgrade, then `Connection` + writer + heartbeat, then registration, then
/// the read loop.  However the read loop ends, the connection is
/// unregistered and closed and both helper tasks are awaited before
/// returning.
async fn run_session(
    stream: TcpStream,
    peer_addr: SocketAddr,
    config: &RelayConfig,
    registry: &Arc<ConnectionRegistry>,
) -> Result<SessionEnd, RelayError> {
    let ws = accept_upgrade(stream, peer_addr, &config.path, config.handshake_timeout).await?;
    let (sink, source) = ws.split();

    let (conn, outbound) = Connection::new(peer_addr, config.into());
    conn.activate();

    let writer = tokio::spawn(write_loop(
        Arc::clone(&conn),
        Arc::clone(registry),
        sink,
        outbound,
        config.send_timeout,
        config.heartbeat.ping_write_timeout,
    ));
    let heartbeat =
        HeartbeatMonitor::new(Arc::clone(&conn), &config.heartbeat, Arc::clone(registry)).spawn();

    let id = match registry.register(Arc::clone(&conn)) {
        Ok(id) => id,
        Err(e) => {
            conn.close();
            join_quietly(heartbeat, writer).await;
            return Err(e.into());
        }
    };
    info!(
        "connection {id} from {peer_addr} registered ({} live)",
        registry.len()
    );

    let mut end = read_loop(&conn, source, registry, config.max_text_bytes).await;

    registry.unregister(id);
    conn.close();
    if join_quietly(heartbeat, writer).await == Some(Liveness::Dead) && end == SessionEnd::Closed {
        end = SessionEnd::HeartbeatTimeout;
    }
    info!(
        "connection {id} from {peer_addr} removed ({} live)",
        registry.len()
    );
    Ok(end)
}

/// Awaits the heartbeat and writer tasks of a closed connection.  Returns
/// the heartbeat's final liveness, or `None` if it panicked.
async fn join_quietly(
    heartbeat: tokio::task::JoinHandle<Liveness>,
    writer: tokio::task::JoinHandle<()>,
) -> Option<Liveness> {
    let liveness = match heartbeat.await {
        Ok(liveness) => Some(liveness),
        Err(e) => {
            error!("heartbeat task failed: {e}");
            None
        }
    };
    if let Err(e) = writer.await {
        error!("writer task failed: {e}");
    }
    liveness
}

/// Completes the WebSocket upgrade, accepting only requests for `path`.
async fn accept_upgrade(
    stream: TcpStream,
    peer_addr: SocketAddr,
    path: &str,
    limit: Duration,
) -> Result<WebSocketStream<TcpStream>, RelayError> {
    let check_path = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        if request.uri().path() == path {
            Ok(response)
        } else {
            debug!(
                "rejecting upgrade from {peer_addr} for path {:?}",
                request.uri().path()
            );
            Err(not_found())
        }
    };

    match timeout(limit, accept_hdr_async(stream, check_path)).await {
        Ok(Ok(ws)) => {
            debug!("WebSocket session established: {peer_addr}");
            Ok(ws)
        }
        Ok(Err(source)) => Err(RelayError::Handshake {
            peer: peer_addr,
            source: Box::new(source),
        }),
        Err(_) => Err(RelayError::HandshakeTimeout {
            peer: peer_addr,
            timeout: limit,
        }),
    }
}

fn not_found() -> ErrorResponse {
    let mut response = ErrorResponse::new(Some("not found".to_string()));
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
}

// ── Pumps ─────────────────────────────────────────────────────────────────────

/// Drains a connection's outbound queue into the WebSocket sink.
///
/// Text frames must be written within `send_timeout`, pings within
/// `ping_write_timeout`.  A failed or stalled write evicts the connection
/// from the registry and closes it.
/// When the connection closes, a Close frame is sent on a best-effort basis.
async fn write_loop<S>(
    conn: Arc<Connection>,
    registry: Arc<ConnectionRegistry>,
    mut sink: S,
    mut outbound: mpsc::Receiver<OutboundFrame>,
    send_timeout: Duration,
    ping_write_timeout: Duration,
) where
    S: Sink<Message, Error = WsError> + Unpin,
{
    loop {
        let frame = tokio::select! {
            biased;
            _ = conn.cancelled() => break,
            frame = outbound.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        let is_ping = matches!(frame, OutboundFrame::Ping(_));
        let (message, limit) = match frame {
            OutboundFrame::Text(text) => (Message::Text(text), send_timeout),
            OutboundFrame::Ping(payload) => (Message::Ping(payload), ping_write_timeout),
        };

        let failure = match timeout(limit, sink.send(message)).await {
            Ok(Ok(())) => continue,
            Ok(Err(e)) => ConnectionError::Transport {
                id: conn.id(),
                reason: e.to_string(),
            },
            Err(_) => ConnectionError::SendTimeout {
                id: conn.id(),
                timeout: limit,
            },
        };
        if is_ping {
            conn.mark_ping_failed();
        }
        registry.evict(&conn, failure);
        break;
    }

    if timeout(CLOSE_FRAME_TIMEOUT, sink.close()).await.is_err() {
        debug!("connection {}: Close frame not sent in time", conn.id());
    }
}

/// Reads frames from the peer until the stream ends or the connection
/// closes.
///
/// Text frames within the size limit are broadcast to every other
/// registered connection, one at a time, in arrival order.  Binary and
/// oversized frames are dropped with a warning; the connection stays open.
async fn read_loop<St>(
    conn: &Connection,
    mut source: St,
    registry: &ConnectionRegistry,
    max_text_bytes: usize,
) -> SessionEnd
where
    St: Stream<Item = Result<Message, WsError>> + Unpin,
{
    loop {
        let next = tokio::select! {
            biased;
            _ = conn.cancelled() => return SessionEnd::Closed,
            next = source.next() => next,
        };

        let message = match next {
            Some(Ok(message)) => message,
            Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => {
                return SessionEnd::PeerClosed;
            }
            Some(Err(e)) => {
                let reason = e.to_string();
                registry.evict(
                    conn,
                    ConnectionError::Transport {
                        id: conn.id(),
                        reason: reason.clone(),
                    },
                );
                return SessionEnd::Transport(reason);
            }
            None => return SessionEnd::StreamEnded,
        };

        match message {
            Message::Text(text) => {
                conn.touch();
                relay_text(conn, text, registry, max_text_bytes).await;
            }
            Message::Binary(data) => {
                conn.touch();
                warn!(
                    "connection {}: {}; frame dropped",
                    conn.id(),
                    binary_frame(data.len())
                );
            }
            Message::Pong(_) => conn.record_pong(),
            // tungstenite queues the Pong reply itself.
            Message::Ping(_) => conn.touch(),
            Message::Close(_) => {
                debug!("connection {}: Close frame received", conn.id());
                return SessionEnd::PeerClosed;
            }
            Message::Frame(_) => {}
        }
    }
}

async fn relay_text(conn: &Connection, text: String, registry: &ConnectionRegistry, max_text_bytes: usize) {
    if let Err(e) = check_text_payload(&text, max_text_bytes) {
        warn!("connection {}: {e}; frame dropped", conn.id());
        return;
    }
    let event = ClipboardEvent::new(text, conn.id());
    debug!(
        "connection {}: clipboard update ({} bytes)",
        conn.id(),
        event.len()
    );
    let report = registry.broadcast(&event, conn.id()).await;
    if report.failed > 0 {
        debug!(
            "connection {}: {} peer(s) dropped during broadcast",
            conn.id(),
            report.failed
        );
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! One peer's connection to the relay.
//!
//! A [`Connection`] knows nothing about WebSockets.  It owns:
//!
//! - the sending side of a bounded queue of [`OutboundFrame`]s, drained by a
//!   writer task in the infrastructure layer,
//! - a [`CancellationToken`] that every task working on behalf of the
//!   connection (reader, writer, heartbeat) selects on,
//! - its lifecycle [`ConnectionState`], heartbeat bookkeeping and last
//!   activity timestamp.
//!
//! # Teardown
//!
//! [`Connection::close`] is a one-shot operation guarded by an atomic flag.
//! Flipping the flag and handing a frame to the queue happen under the same
//! gate, so once `close` has returned no further frame can be queued.
//! The read loop, the writer, the heartbeat monitor and the registry may all
//! race to close the same connection; exactly one call performs the teardown
//! and returns `true`, the others return `false`.  Teardown cancels the
//! token, which makes the writer send a Close frame and drop the sink, the
//! reader drop the stream (closing the socket) and the heartbeat timer stop.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use clipsync_core::ConnectionId;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::{debug, warn};

use crate::domain::{HeartbeatState, Liveness, RelayConfig};

/// Lifecycle of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Constructed, upgrade complete, not yet serving.
    Connecting,
    /// Serving: may be registered and receive broadcasts.
    Active,
    /// Teardown in progress.
    Closing,
    /// Teardown finished; all derived tasks have been told to stop.
    Closed,
}

/// A frame waiting to be written to the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// Clipboard text.
    Text(String),
    /// Heartbeat probe.
    Ping(Vec<u8>),
}

/// Failures of a single connection.  None of them ever affects another
/// connection.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConnectionError {
    /// The connection has already been closed.
    #[error("connection {0} is closed")]
    Closed(ConnectionId),

    /// The outbound queue stayed full, or a write stalled, past the deadline.
    #[error("send to connection {id} timed out after {timeout:?}")]
    SendTimeout {
        id: ConnectionId,
        timeout: Duration,
    },

    /// The underlying transport failed while reading or writing.
    #[error("transport error on connection {id}: {reason}")]
    Transport { id: ConnectionId, reason: String },

    /// The peer did not answer pings in time.
    #[error("connection {id} missed its heartbeat (silent for {silent_for:?})")]
    HeartbeatTimeout {
        id: ConnectionId,
        silent_for: Duration,
    },
}

/// Per-connection limits, derived from [`RelayConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Frames buffered before `send` has to wait.
    pub outbound_capacity: usize,
    /// Deadline for queueing (and writing) one text frame.
    pub send_timeout: Duration,
    /// Deadline for queueing (and writing) one ping.
    pub ping_write_timeout: Duration,
    /// Silence allowed before the heartbeat declares the peer dead.
    pub pong_timeout: Duration,
}

impl From<&RelayConfig> for ConnectionSettings {
    fn from(config: &RelayConfig) -> Self {
        Self {
            outbound_capacity: config.outbound_capacity,
            send_timeout: config.send_timeout,
            ping_write_timeout: config.heartbeat.ping_write_timeout,
            pong_timeout: config.heartbeat.pong_timeout,
        }
    }
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self::from(&RelayConfig::default())
    }
}

/// Reads the clock the way tokio sees it, so paused-time tests drive the
/// heartbeat deterministically.
pub(crate) fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

/// Locks a mutex, recovering the data if a panicking thread poisoned it.  All
/// guarded values here are plain data that stay consistent across a panic.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One peer's bidirectional text channel.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    peer_addr: SocketAddr,
    outbound: mpsc::Sender<OutboundFrame>,
    settings: ConnectionSettings,
    state: Mutex<ConnectionState>,
    heartbeat: Mutex<HeartbeatState>,
    last_activity: Mutex<Instant>,
    closed: AtomicBool,
    /// Serialises `close` against the final hand-off of a frame to the queue.
    gate: Mutex<()>,
    cancel: CancellationToken,
}

impl Connection {
    /// Creates a connection in the `Connecting` state.
    ///
    /// Returns the shared handle together with the receiving end of its
    /// outbound queue; whoever owns the transport drains that receiver.
    pub fn new(
        peer_addr: SocketAddr,
        settings: ConnectionSettings,
    ) -> (Arc<Self>, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(settings.outbound_capacity.max(1));
        let started = now();
        let conn = Self {
            id: ConnectionId::new(),
            peer_addr,
            outbound: tx,
            heartbeat: Mutex::new(HeartbeatState::new(started, settings.pong_timeout)),
            settings,
            state: Mutex::new(ConnectionState::Connecting),
            last_activity: Mutex::new(started),
            closed: AtomicBool::new(false),
            gate: Mutex::new(()),
            cancel: CancellationToken::new(),
        };
        (Arc::new(conn), rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn state(&self) -> ConnectionState {
        *lock(&self.state)
    }

    pub fn is_active(&self) -> bool {
        self.state() == ConnectionState::Active
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Moves `Connecting → Active`.  Returns `false` if the connection was in
    /// any other state.
    pub fn activate(&self) -> bool {
        let mut state = lock(&self.state);
        if *state == ConnectionState::Connecting && !self.is_closed() {
            *state = ConnectionState::Active;
            true
        } else {
            false
        }
    }

    /// Enqueues a text frame for the peer.
    ///
    /// Frames are written in the order `send` was called.  Waits at most
    /// `send_timeout` for room in the queue, and returns immediately if the
    /// connection is closed meanwhile.
    ///
    /// # Errors
    ///
    /// - [`ConnectionError::Closed`] if the connection is (or becomes) closed.
    /// - [`ConnectionError::SendTimeout`] if the queue stayed full.
    pub async fn send(&self, text: String) -> Result<(), ConnectionError> {
        self.enqueue(OutboundFrame::Text(text), self.settings.send_timeout)
            .await
    }

    /// Enqueues a heartbeat ping, waiting at most `ping_write_timeout`.
    ///
    /// # Errors
    ///
    /// Same as [`Connection::send`].
    pub async fn ping(&self, payload: Vec<u8>) -> Result<(), ConnectionError> {
        self.enqueue(OutboundFrame::Ping(payload), self.settings.ping_write_timeout)
            .await
    }

    async fn enqueue(&self, frame: OutboundFrame, timeout: Duration) -> Result<(), ConnectionError> {
        if self.is_closed() {
            return Err(ConnectionError::Closed(self.id));
        }
        let permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(ConnectionError::Closed(self.id)),
            reserved = tokio::time::timeout(timeout, self.outbound.reserve()) => match reserved {
                Ok(Ok(permit)) => permit,
                Ok(Err(_)) => return Err(ConnectionError::Closed(self.id)),
                Err(_) => {
                    return Err(ConnectionError::SendTimeout {
                        id: self.id,
                        timeout,
                    })
                }
            },
        };

        let _gate = lock(&self.gate);
        if self.is_closed() {
            return Err(ConnectionError::Closed(self.id));
        }
        permit.send(frame);
        Ok(())
    }

    /// Records inbound traffic of any kind.
    pub fn touch(&self) {
        *lock(&self.last_activity) = now();
    }

    /// When the peer last sent anything.
    pub fn last_activity(&self) -> Instant {
        *lock(&self.last_activity)
    }

    /// Records a pong from the peer.
    pub fn record_pong(&self) {
        let at = now();
        *lock(&self.last_activity) = at;
        lock(&self.heartbeat).on_pong(at);
    }

    pub(crate) fn mark_ping_sent(&self) {
        lock(&self.heartbeat).on_ping_sent();
    }

    pub(crate) fn mark_ping_failed(&self) {
        lock(&self.heartbeat).on_ping_failed();
    }

    /// Re-evaluates the heartbeat deadline at `at`.
    pub fn check_liveness(&self, at: Instant) -> Liveness {
        lock(&self.heartbeat).check(at)
    }

    /// When the last pong arrived (or the connection was set up).
    pub fn last_pong_at(&self) -> Instant {
        lock(&self.heartbeat).last_pong_at()
    }

    /// Resolves once the connection has been closed.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    /// Handles a terminal error: logs it and closes the connection.
    ///
    /// Returns whether this call performed the teardown.
    pub fn fail(&self, error: ConnectionError) -> bool {
        if self.is_closed() {
            debug!("connection {} ({}): {error} after close", self.id, self.peer_addr);
            return false;
        }
        warn!("connection {} ({}): {error}", self.id, self.peer_addr);
        self.close()
    }

    /// Tears the connection down exactly once.
    ///
    /// Cancels every task bound to this connection.  Safe to call any number
    /// of times from any task; only the first call returns `true`.
    pub fn close(&self) -> bool {
        let first = {
            let _gate = lock(&self.gate);
            self.closed
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        };
        if !first {
            return false;
        }
        self.set_state(ConnectionState::Closing);
        self.cancel.cancel();
        self.set_state(ConnectionState::Closed);
        debug!("connection {} ({}) closed", self.id, self.peer_addr);
        true
    }

    fn set_state(&self, next: ConnectionState) {
        *lock(&self.state) = next;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! ConnectionRegistry: the set of live connections and clipboard fan-out.
//!
//! The registry's membership map is the only state shared between session
//! tasks.  It is guarded by a single mutex with a strict discipline:
//!
//! - `register`, `unregister`, `shutdown` and the broadcast *snapshot* each
//!   hold the lock for a map operation only.
//! - No `.await` ever happens while the lock is held.  Broadcast copies the
//!   recipients out, releases the lock, and only then sends, so a slow peer
//!   can never block registration or removal of others.
//!
//! # Fan-out rules
//!
//! - An event goes to every registered connection except the one excluded
//!   (its sender), exactly once per broadcast.
//! - Delivery is best-effort: a failing peer is removed from the map and
//!   closed, and the remaining peers still receive the event.
//! - Every entry in the map is `Active`: whoever closes a member because of
//!   a failure removes it in the same step ([`ConnectionRegistry::evict`]).
//! - A recipient that was unregistered or closed after the snapshot was taken
//!   is skipped, not treated as an error.
//! - There is no backlog: a connection registered after a broadcast never
//!   sees that event.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use clipsync_core::{ClipboardEvent, ConnectionId};
use futures_util::future::join_all;
use thiserror::Error;
use tracing::{debug, info};

use crate::application::connection::{Connection, ConnectionError};

/// Why a registration was rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The relay is shutting down and accepts no new members.
    #[error("relay is shutting down")]
    ShuttingDown,

    /// The configured connection limit is reached.
    #[error("relay is full ({limit} connections)")]
    Full { limit: usize },

    /// Only `Active` connections may join.
    #[error("connection {0} is not active")]
    NotActive(ConnectionId),
}

/// Outcome of one broadcast.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Peers whose outbound queue accepted the event.
    pub delivered: usize,
    /// Peers that left (unregistered or closed) before the send.
    pub skipped: usize,
    /// Peers whose send failed; each has been removed and closed.
    pub failed: usize,
}

impl BroadcastReport {
    /// Number of peers the broadcast targeted.
    pub fn recipients(&self) -> usize {
        self.delivered + self.skipped + self.failed
    }
}

enum Delivery {
    Delivered,
    Skipped,
    Failed,
}

#[derive(Default)]
struct Membership {
    connections: HashMap<ConnectionId, Arc<Connection>>,
    shutting_down: bool,
}

/// The set of live connections.
///
/// Shared between the accept loop and all session tasks through an `Arc`.
#[derive(Default)]
pub struct ConnectionRegistry {
    members: Mutex<Membership>,
    max_connections: Option<usize>,
}

impl ConnectionRegistry {
    /// Creates an empty registry, optionally capped at `max_connections`.
    pub fn new(max_connections: Option<usize>) -> Self {
        Self {
            members: Mutex::new(Membership::default()),
            max_connections,
        }
    }

    fn members(&self) -> MutexGuard<'_, Membership> {
        self.members.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds an `Active` connection and returns its id.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::ShuttingDown`] once [`ConnectionRegistry::shutdown`]
    ///   has been called.
    /// - [`RegistryError::Full`] when the connection limit is reached.
    /// - [`RegistryError::NotActive`] if the connection is not `Active`.
    pub fn register(&self, conn: Arc<Connection>) -> Result<ConnectionId, RegistryError> {
        let id = conn.id();
        let mut members = self.members();
        if members.shutting_down {
            return Err(RegistryError::ShuttingDown);
        }
        if !conn.is_active() {
            return Err(RegistryError::NotActive(id));
        }
        if let Some(limit) = self.max_connections {
            if members.connections.len() >= limit {
                return Err(RegistryError::Full { limit });
            }
        }
        members.connections.insert(id, conn);
        Ok(id)
    }

    /// Removes a connection and closes it.  Returns it the first time,
    /// `None` afterwards.
    ///
    /// Once this returns, no broadcast can queue another frame for `id`.
    pub fn unregister(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        let removed = self.members().connections.remove(&id);
        if let Some(conn) = &removed {
            conn.close();
        }
        removed
    }

    /// Removes `conn` (if registered) and closes it with `error`.
    ///
    /// Used by whoever detects a terminal failure (a broadcast send, the
    /// heartbeat, the writer) so the entry leaves the map together with the
    /// teardown instead of waiting for the session task.  Returns whether
    /// this call performed the teardown.
    pub fn evict(&self, conn: &Connection, error: ConnectionError) -> bool {
        let removed = self.members().connections.remove(&conn.id()).is_some();
        if removed {
            debug!("connection {} evicted", conn.id());
        }
        conn.fail(error)
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.members().connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.members().connections.contains_key(&id)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.members().shutting_down
    }

    /// Ids of all registered connections, in no particular order.
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.members().connections.keys().copied().collect()
    }

    fn snapshot(&self, exclude: ConnectionId) -> Vec<Arc<Connection>> {
        self.members()
            .connections
            .iter()
            .filter(|(id, _)| **id != exclude)
            .map(|(_, conn)| Arc::clone(conn))
            .collect()
    }

    /// Delivers `event` to every registered connection except `exclude`.
    ///
    /// Sends run concurrently outside the membership lock; each one is
    /// bounded by the recipient's send timeout.  A recipient whose send fails
    /// is closed and counted in [`BroadcastReport::failed`].
    pub async fn broadcast(&self, event: &ClipboardEvent, exclude: ConnectionId) -> BroadcastReport {
        let targets = self.snapshot(exclude);
        if targets.is_empty() {
            return BroadcastReport::default();
        }

        let sends = targets.into_iter().map(|conn| async move {
            // The snapshot may be stale by now.
            if !conn.is_active() || !self.contains(conn.id()) {
                return Delivery::Skipped;
            }
            match conn.send(event.text.clone()).await {
                Ok(()) => Delivery::Delivered,
                Err(ConnectionError::Closed(_)) => Delivery::Skipped,
                Err(error) => {
                    self.evict(&conn, error);
                    Delivery::Failed
                }
            }
        });

        let mut report = BroadcastReport::default();
        for delivery in join_all(sends).await {
            match delivery {
                Delivery::Delivered => report.delivered += 1,
                Delivery::Skipped => report.skipped += 1,
                Delivery::Failed => report.failed += 1,
            }
        }
        debug!(
            "broadcast {} bytes from {}: {} delivered, {} skipped, {} failed",
            event.len(),
            event.source,
            report.delivered,
            report.skipped,
            report.failed
        );
        report
    }

    /// Stops accepting registrations and closes every member.
    ///
    /// Returns the number of connections that were closed.  Calling it again
    /// is harmless and returns 0.
    pub fn shutdown(&self) -> usize {
        let drained: Vec<Arc<Connection>> = {
            let mut members = self.members();
            members.shutting_down = true;
            members.connections.drain().map(|(_, conn)| conn).collect()
        };
        for conn in &drained {
            conn.close();
        }
        if !drained.is_empty() {
            info!("registry shut down; closed {} connection(s)", drained.len());
        }
        drained.len()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! HeartbeatMonitor: periodic ping and pong deadline for one connection.
//!
//! One monitor task runs per connection.  Every `ping_interval` it first
//! checks the pong deadline, then queues a Ping.  A peer that has not
//! answered within `pong_timeout` of its last pong (or of connection setup)
//! evicted from the [`ConnectionRegistry`] and closed in one step, so a dead
//! peer never lingers in the membership map.
//!
//! Detection latency is bounded by `ping_interval + pong_timeout`.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant as TokioInstant, MissedTickBehavior};
use tracing::{debug, trace};

use crate::application::connection::{now, Connection, ConnectionError};
use crate::application::registry::ConnectionRegistry;
use crate::domain::{HeartbeatConfig, Liveness};

/// Payload carried by every heartbeat Ping.
pub const PING_PAYLOAD: &[u8] = b"ping";

/// Drives the heartbeat of a single connection.
pub struct HeartbeatMonitor {
    conn: Arc<Connection>,
    registry: Arc<ConnectionRegistry>,
    ping_interval: Duration,
}

impl HeartbeatMonitor {
    /// `registry` is where the connection is (or is about to be) registered.
    pub fn new(
        conn: Arc<Connection>,
        config: &HeartbeatConfig,
        registry: Arc<ConnectionRegistry>,
    ) -> Self {
        Self {
            conn,
            registry,
            ping_interval: config.ping_interval,
        }
    }

    /// Runs the monitor on its own task.
    ///
    /// The task ends when the connection closes or the peer is declared dead;
    /// its output is the final liveness.
    pub fn spawn(self) -> JoinHandle<Liveness> {
        tokio::spawn(self.run())
    }

    /// Ping loop.  Returns [`Liveness::Dead`] if this monitor closed the
    /// connection, otherwise the liveness at the moment the connection was
    /// closed by someone else.
    pub async fn run(self) -> Liveness {
        let HeartbeatMonitor {
            conn,
            registry,
            ping_interval,
        } = self;
        let start = TokioInstant::now() + ping_interval;
        let mut ticker = interval_at(start, ping_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = conn.cancelled() => {
                    trace!("heartbeat for {} stopped: connection closed", conn.id());
                    return conn.check_liveness(now());
                }
                _ = ticker.tick() => {}
            }

            let at = now();
            if conn.check_liveness(at) == Liveness::Dead {
                let silent_for = at.saturating_duration_since(conn.last_pong_at());
                registry.evict(
                    &conn,
                    ConnectionError::HeartbeatTimeout {
                        id: conn.id(),
                        silent_for,
                    },
                );
                return Liveness::Dead;
            }

            match conn.ping(PING_PAYLOAD.to_vec()).await {
                Ok(()) => conn.mark_ping_sent(),
                Err(ConnectionError::Closed(_)) => return conn.check_liveness(now()),
                Err(error) => {
                    debug!("ping to {} could not be queued", conn.id());
                    conn.mark_ping_failed();
                    registry.evict(&conn, error);
                    return Liveness::Dead;
                }
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    use tokio::sync::mpsc;

    use crate::application::connection::{ConnectionSettings, OutboundFrame};

    fn heartbeat() -> HeartbeatConfig {
        HeartbeatConfig {
            ping_interval: Duration::from_secs(10),
            pong_timeout: Duration::from_secs(30),
            ping_write_timeout: Duration::from_secs(1),
        }
    }

    fn registry() -> Arc<ConnectionRegistry> {
        Arc::new(ConnectionRegistry::new(None))
    }

    fn connection(capacity: usize) -> (Arc<Connection>, mpsc::Receiver<OutboundFrame>) {
        let peer: SocketAddr = "127.0.0.1:40002".parse().unwrap();
        let hb = heartbeat();
        let (conn, rx) = Connection::new(
            peer,
            ConnectionSettings {
                outbound_capacity: capacity,
                send_timeout: Duration::from_secs(5),
                ping_write_timeout: hb.ping_write_timeout,
                pong_timeout: hb.pong_timeout,
            },
        );
        conn.activate();
        (conn, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_peer_is_closed_within_detection_bound() {
        // Arrange: the peer drains frames but never answers a ping
        let (conn, mut rx) = connection(16);
        let drain = tokio::spawn(async move { while rx.recv().await.is_some() {} });
        let monitor = HeartbeatMonitor::new(Arc::clone(&conn), &heartbeat(), registry()).spawn();

        // Act
        let outcome = tokio::time::timeout(heartbeat().detection_bound(), monitor)
            .await
            .expect("dead peer must be detected within interval + timeout")
            .unwrap();

        // Assert
        assert_eq!(outcome, Liveness::Dead);
        assert!(conn.is_closed());
        drain.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_peer_is_removed_from_registry() {
        // Arrange
        let (conn, mut rx) = connection(16);
        let drain = tokio::spawn(async move { while rx.recv().await.is_some() {} });
        let registry = registry();
        let id = registry.register(Arc::clone(&conn)).unwrap();
        let monitor =
            HeartbeatMonitor::new(Arc::clone(&conn), &heartbeat(), Arc::clone(&registry)).spawn();

        // Act
        let outcome = monitor.await.unwrap();

        // Assert: gone from the registry as soon as the monitor returns
        assert_eq!(outcome, Liveness::Dead);
        assert!(!registry.contains(id));
        assert!(registry.is_empty());
        drain.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_responsive_peer_stays_alive() {
        // Arrange: answer every ping with a pong
        let (conn, mut rx) = connection(16);
        let responder = {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move {
                let mut pings = 0usize;
                loop {
                    tokio::select! {
                        _ = conn.cancelled() => break,
                        frame = rx.recv() => match frame {
                            Some(OutboundFrame::Ping(payload)) => {
                                assert_eq!(payload, PING_PAYLOAD);
                                pings += 1;
                                conn.record_pong();
                            }
                            Some(OutboundFrame::Text(_)) => {}
                            None => break,
                        },
                    }
                }
                pings
            })
        };
        let monitor = HeartbeatMonitor::new(Arc::clone(&conn), &heartbeat(), registry()).spawn();

        // Act: two minutes of simulated time
        tokio::time::sleep(Duration::from_secs(120)).await;

        // Assert
        assert!(!conn.is_closed());
        conn.close();
        assert_ne!(monitor.await.unwrap(), Liveness::Dead);
        assert!(responder.await.unwrap() >= 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_stops_when_connection_closes() {
        let (conn, _rx) = connection(16);
        let monitor = HeartbeatMonitor::new(Arc::clone(&conn), &heartbeat(), registry()).spawn();

        conn.close();

        let outcome = tokio::time::timeout(Duration::from_secs(1), monitor)
            .await
            .expect("monitor must exit promptly after close")
            .unwrap();
        assert_ne!(outcome, Liveness::Dead);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ping_that_cannot_be_queued_kills_connection() {
        // Arrange: queue of one, already full, nobody drains it
        let (conn, _rx) = connection(1);
        conn.send("backlog".into()).await.unwrap();
        let monitor = HeartbeatMonitor::new(Arc::clone(&conn), &heartbeat(), registry()).spawn();

        // Act: first tick at 10 s, ping write timeout 1 s
        let outcome = tokio::time::timeout(Duration::from_secs(12), monitor)
            .await
            .expect("stalled ping must be detected")
            .unwrap();

        // Assert
        assert_eq!(outcome, Liveness::Dead);
        assert!(conn.is_closed());
    }
}

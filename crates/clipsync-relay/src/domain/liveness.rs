//! Heartbeat liveness state machine.
//!
//! Each connection carries one [`HeartbeatState`].  The heartbeat timer and
//! the read loop feed it events; it answers whether the peer is still alive.
//!
//! ```text
//!            ping sent              pong received
//!   Alive ─────────────► AwaitingPong ─────────────► Alive
//!     │                      │
//!     │ deadline passed      │ deadline passed / ping write failed
//!     ▼                      ▼
//!    Dead ◄──────────────────┘
//! ```
//!
//! The deadline is `last_pong_at + pong_timeout`, where `last_pong_at` starts
//! at connection setup.  `Dead` is terminal: a late pong does not revive the
//! connection.

use std::time::{Duration, Instant};

/// Liveness classification of a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// The last pong (or connection setup) is within the deadline and no ping
    /// is outstanding.
    Alive,
    /// A ping has been sent and its pong has not arrived yet.
    AwaitingPong,
    /// The peer missed its deadline or a ping could not be written.
    Dead,
}

/// Per-connection heartbeat bookkeeping.
#[derive(Debug, Clone)]
pub struct HeartbeatState {
    liveness: Liveness,
    last_pong_at: Instant,
    pong_timeout: Duration,
}

impl HeartbeatState {
    /// Starts a fresh state at `now`, counting connection setup as the first
    /// sign of life.
    pub fn new(now: Instant, pong_timeout: Duration) -> Self {
        Self {
            liveness: Liveness::Alive,
            last_pong_at: now,
            pong_timeout,
        }
    }

    /// Current classification, without re-evaluating the deadline.
    pub fn liveness(&self) -> Liveness {
        self.liveness
    }

    /// When the last pong arrived (or the connection was set up).
    pub fn last_pong_at(&self) -> Instant {
        self.last_pong_at
    }

    /// Instant after which the peer counts as dead.
    pub fn deadline(&self) -> Instant {
        self.last_pong_at + self.pong_timeout
    }

    /// Records that a ping was written.
    pub fn on_ping_sent(&mut self) {
        if self.liveness == Liveness::Alive {
            self.liveness = Liveness::AwaitingPong;
        }
    }

    /// Records a pong arriving at `now`.  Ignored once the peer is dead.
    pub fn on_pong(&mut self, now: Instant) {
        if self.liveness == Liveness::Dead {
            return;
        }
        self.last_pong_at = now;
        self.liveness = Liveness::Alive;
    }

    /// Records a ping that could not be written; treated like a missed pong.
    pub fn on_ping_failed(&mut self) {
        self.liveness = Liveness::Dead;
    }

    /// Re-evaluates the deadline at `now` and returns the resulting state.
    pub fn check(&mut self, now: Instant) -> Liveness {
        if self.liveness != Liveness::Dead && now >= self.deadline() {
            self.liveness = Liveness::Dead;
        }
        self.liveness
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(30);

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn test_new_state_is_alive_with_deadline_after_timeout() {
        let t0 = Instant::now();
        let state = HeartbeatState::new(t0, TIMEOUT);
        assert_eq!(state.liveness(), Liveness::Alive);
        assert_eq!(state.deadline(), t0 + TIMEOUT);
    }

    #[test]
    fn test_ping_moves_alive_to_awaiting_pong() {
        let mut state = HeartbeatState::new(Instant::now(), TIMEOUT);
        state.on_ping_sent();
        assert_eq!(state.liveness(), Liveness::AwaitingPong);
    }

    #[test]
    fn test_pong_returns_to_alive_and_extends_deadline() {
        // Arrange
        let t0 = Instant::now();
        let mut state = HeartbeatState::new(t0, TIMEOUT);
        state.on_ping_sent();

        // Act: pong arrives 10 s later
        state.on_pong(t0 + secs(10));

        // Assert
        assert_eq!(state.liveness(), Liveness::Alive);
        assert_eq!(state.deadline(), t0 + secs(40));
        assert_eq!(state.check(t0 + secs(35)), Liveness::Alive);
    }

    #[test]
    fn test_missing_pong_past_deadline_is_dead() {
        let t0 = Instant::now();
        let mut state = HeartbeatState::new(t0, TIMEOUT);
        state.on_ping_sent();
        assert_eq!(state.check(t0 + secs(29)), Liveness::AwaitingPong);
        assert_eq!(state.check(t0 + secs(30)), Liveness::Dead);
    }

    #[test]
    fn test_dead_is_terminal_even_if_pong_arrives_late() {
        let t0 = Instant::now();
        let mut state = HeartbeatState::new(t0, TIMEOUT);
        state.on_ping_sent();
        state.check(t0 + secs(31));

        state.on_pong(t0 + secs(32));

        assert_eq!(state.liveness(), Liveness::Dead);
        assert_eq!(state.last_pong_at(), t0);
    }

    #[test]
    fn test_failed_ping_is_dead_immediately() {
        let t0 = Instant::now();
        let mut state = HeartbeatState::new(t0, TIMEOUT);
        state.on_ping_failed();
        assert_eq!(state.check(t0), Liveness::Dead);
    }

    #[test]
    fn test_ping_while_awaiting_keeps_awaiting() {
        let mut state = HeartbeatState::new(Instant::now(), TIMEOUT);
        state.on_ping_sent();
        state.on_ping_sent();
        assert_eq!(state.liveness(), Liveness::AwaitingPong);
    }
}

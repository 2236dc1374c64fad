//! Relay configuration types.
//!
//! [`RelayConfig`] is the single source of truth for all runtime settings.
//! It starts from [`Default`], may be overlaid by a TOML file
//! (`infrastructure::config_file`) and finally by CLI flags or environment
//! variables (`main.rs`).  [`RelayConfig::validate`] runs once, after all
//! layers have been applied, before the server binds.

use std::net::SocketAddr;
use std::time::Duration;

use clipsync_core::{DEFAULT_MAX_TEXT_BYTES, DEFAULT_PATH, DEFAULT_PORT};
use thiserror::Error;

/// A configuration that cannot be used to start the relay.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The pong timeout must be strictly longer than the ping interval,
    /// otherwise a healthy peer could be declared dead between two pings.
    #[error(
        "pong timeout ({pong_timeout:?}) must be longer than the ping interval ({ping_interval:?})"
    )]
    PongTimeoutTooShort {
        ping_interval: Duration,
        pong_timeout: Duration,
    },

    /// A duration setting is zero.
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    /// A size or capacity setting is zero.
    #[error("{0} must be greater than zero")]
    ZeroLimit(&'static str),

    /// The upgrade path does not start with `/`.
    #[error("WebSocket path must start with '/', got {0:?}")]
    InvalidPath(String),
}

/// Liveness probing parameters for every connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// How often the relay sends a WebSocket Ping to each peer.
    pub ping_interval: Duration,

    /// How long a peer may stay silent (no Pong) before it is declared dead.
    ///
    /// Measured from the last Pong, or from connection setup if none has
    /// arrived yet.
    pub pong_timeout: Duration,

    /// Write deadline for a single Ping frame.  A ping that cannot be written
    /// in time counts as a missed pong.
    pub ping_write_timeout: Duration,
}

impl Default for HeartbeatConfig {
    /// | Field              | Default |
    /// |--------------------|---------|
    /// | ping_interval      | 10 s    |
    /// | pong_timeout       | 30 s    |
    /// | ping_write_timeout | 1 s     |
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(10),
            pong_timeout: Duration::from_secs(30),
            ping_write_timeout: Duration::from_secs(1),
        }
    }
}

impl HeartbeatConfig {
    /// Upper bound on how long a dead peer can stay registered:
    /// `ping_interval + pong_timeout`.
    pub fn detection_bound(&self) -> Duration {
        self.ping_interval + self.pong_timeout
    }

    /// Checks the heartbeat invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if any duration is zero or if
    /// `pong_timeout <= ping_interval`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ping_interval.is_zero() {
            return Err(ConfigError::ZeroDuration("ping interval"));
        }
        if self.ping_write_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("ping write timeout"));
        }
        if self.pong_timeout <= self.ping_interval {
            return Err(ConfigError::PongTimeoutTooShort {
                ping_interval: self.ping_interval,
                pong_timeout: self.pong_timeout,
            });
        }
        Ok(())
    }
}

/// All runtime configuration for the relay.
///
/// Build this once at startup, then wrap it in an `Arc` so it can be shared
/// across all session tasks.
///
/// # Example
///
/// ```rust
/// use clipsync_relay::domain::RelayConfig;
///
/// let cfg = RelayConfig::default();
/// assert_eq!(cfg.listen_addr.port(), 8080);
/// assert_eq!(cfg.path, "/");
/// assert!(cfg.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Address and port the relay listens on.
    pub listen_addr: SocketAddr,

    /// HTTP path at which WebSocket upgrades are accepted.  Requests for any
    /// other path are answered with 404.
    pub path: String,

    /// Ping/pong liveness parameters.
    pub heartbeat: HeartbeatConfig,

    /// Deadline for queueing and writing one clipboard frame to a peer.  A
    /// peer that cannot keep up within this time is closed so it never
    /// starves the others.
    pub send_timeout: Duration,

    /// Number of outbound frames buffered per connection before `send`
    /// starts waiting.
    pub outbound_capacity: usize,

    /// Largest accepted clipboard payload, in UTF-8 bytes.
    pub max_text_bytes: usize,

    /// Optional cap on simultaneously registered connections.
    pub max_connections: Option<usize>,

    /// Time allowed for a freshly accepted socket to complete the WebSocket
    /// upgrade.
    pub handshake_timeout: Duration,

    /// Time allowed for sessions to wind down after shutdown before their
    /// tasks are aborted.
    pub shutdown_grace: Duration,

    /// Default `tracing` filter when `RUST_LOG` is not set.
    pub log_level: String,
}

impl Default for RelayConfig {
    /// | Field             | Default         |
    /// |-------------------|-----------------|
    /// | listen_addr       | `0.0.0.0:8080`  |
    /// | path              | `/`             |
    /// | send_timeout      | 5 s             |
    /// | outbound_capacity | 64 frames       |
    /// | max_text_bytes    | 1 MiB           |
    /// | max_connections   | unlimited       |
    /// | handshake_timeout | 10 s            |
    /// | shutdown_grace    | 5 s             |
    /// | log_level         | `info`          |
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            path: DEFAULT_PATH.to_string(),
            heartbeat: HeartbeatConfig::default(),
            send_timeout: Duration::from_secs(5),
            outbound_capacity: 64,
            max_text_bytes: DEFAULT_MAX_TEXT_BYTES,
            max_connections: None,
            handshake_timeout: Duration::from_secs(10),
            shutdown_grace: Duration::from_secs(5),
            log_level: "info".to_string(),
        }
    }
}

impl RelayConfig {
    /// Checks every invariant of the configuration.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.heartbeat.validate()?;
        if !self.path.starts_with('/') {
            return Err(ConfigError::InvalidPath(self.path.clone()));
        }
        if self.send_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("send timeout"));
        }
        if self.handshake_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("handshake timeout"));
        }
        if self.outbound_capacity == 0 {
            return Err(ConfigError::ZeroLimit("outbound queue capacity"));
        }
        if self.max_text_bytes == 0 {
            return Err(ConfigError::ZeroLimit("max text bytes"));
        }
        if self.max_connections == Some(0) {
            return Err(ConfigError::ZeroLimit("max connections"));
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_listen_port_is_8080() {
        let cfg = RelayConfig::default();
        assert_eq!(cfg.listen_addr.port(), 8080);
        assert_eq!(cfg.listen_addr.ip().to_string(), "0.0.0.0");
    }

    #[test]
    fn test_default_heartbeat_is_10s_ping_30s_pong_1s_write() {
        let hb = HeartbeatConfig::default();
        assert_eq!(hb.ping_interval, Duration::from_secs(10));
        assert_eq!(hb.pong_timeout, Duration::from_secs(30));
        assert_eq!(hb.ping_write_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_detection_bound_is_interval_plus_timeout() {
        assert_eq!(
            HeartbeatConfig::default().detection_bound(),
            Duration::from_secs(40)
        );
    }

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(RelayConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_pong_timeout_equal_to_interval_is_rejected() {
        // Arrange
        let hb = HeartbeatConfig {
            ping_interval: Duration::from_secs(10),
            pong_timeout: Duration::from_secs(10),
            ping_write_timeout: Duration::from_secs(1),
        };

        // Act
        let result = hb.validate();

        // Assert
        assert!(matches!(
            result,
            Err(ConfigError::PongTimeoutTooShort { .. })
        ));
    }

    #[test]
    fn test_zero_ping_interval_is_rejected() {
        let hb = HeartbeatConfig {
            ping_interval: Duration::ZERO,
            ..HeartbeatConfig::default()
        };
        assert_eq!(
            hb.validate(),
            Err(ConfigError::ZeroDuration("ping interval"))
        );
    }

    #[test]
    fn test_path_without_leading_slash_is_rejected() {
        let cfg = RelayConfig {
            path: "clip".to_string(),
            ..RelayConfig::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::InvalidPath("clip".to_string()))
        );
    }

    #[test]
    fn test_zero_max_connections_is_rejected() {
        let cfg = RelayConfig {
            max_connections: Some(0),
            ..RelayConfig::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::ZeroLimit("max connections"))
        );
    }

    #[test]
    fn test_zero_outbound_capacity_is_rejected() {
        let cfg = RelayConfig {
            outbound_capacity: 0,
            ..RelayConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}

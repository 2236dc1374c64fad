//! TOML configuration file for the relay.
//!
//! Every key is optional.  A file only needs the settings it wants to change;
//! the rest keep their built-in defaults, and CLI flags or environment
//! variables still override whatever the file says.
//!
//! ```toml
//! [relay]
//! bind = "0.0.0.0"
//! port = 8080
//! path = "/"
//! log_level = "info"
//! handshake_timeout_secs = 10
//! shutdown_grace_secs = 5
//!
//! [heartbeat]
//! ping_interval_secs = 10
//! pong_timeout_secs = 30
//! ping_write_timeout_ms = 1000
//!
//! [limits]
//! max_text_bytes = 1048576
//! max_connections = 256
//! send_timeout_ms = 5000
//! outbound_queue = 64
//! ```
//!
//! Unknown keys are rejected so that a typo does not silently fall back to a
//! default.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::domain::RelayConfig;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// The file could not be read.
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// `relay.bind` is not an IP address.
    #[error("invalid bind address {0:?}")]
    InvalidAddress(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level layout of the relay's TOML file.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct RelayFileConfig {
    pub relay: RelaySection,
    pub heartbeat: HeartbeatSection,
    pub limits: LimitsSection,
}

/// `[relay]`: listener and process settings.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct RelaySection {
    /// IP address to bind.  `"0.0.0.0"` binds all interfaces.
    pub bind: Option<String>,
    pub port: Option<u16>,
    /// WebSocket upgrade path.
    pub path: Option<String>,
    /// `tracing` filter used when `RUST_LOG` is unset.
    pub log_level: Option<String>,
    pub handshake_timeout_secs: Option<u64>,
    pub shutdown_grace_secs: Option<u64>,
}

/// `[heartbeat]`: ping/pong liveness probing.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct HeartbeatSection {
    pub ping_interval_secs: Option<u64>,
    pub pong_timeout_secs: Option<u64>,
    pub ping_write_timeout_ms: Option<u64>,
}

/// `[limits]`: payload size, connection count and backpressure.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsSection {
    pub max_text_bytes: Option<usize>,
    pub max_connections: Option<usize>,
    pub send_timeout_ms: Option<u64>,
    pub outbound_queue: Option<usize>,
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Reads and parses a config file.
///
/// # Errors
///
/// Returns [`ConfigFileError::Io`] if the file cannot be read and
/// [`ConfigFileError::Parse`] if it is not valid relay TOML.
pub fn load_config_file(path: &Path) -> Result<RelayFileConfig, ConfigFileError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse_config_str(&text)?;
    debug!("loaded relay config from {}", path.display());
    Ok(config)
}

/// Parses relay TOML from a string.
///
/// # Errors
///
/// Returns [`ConfigFileError::Parse`] on malformed TOML or unknown keys.
pub fn parse_config_str(text: &str) -> Result<RelayFileConfig, ConfigFileError> {
    Ok(toml::from_str(text)?)
}

impl RelayFileConfig {
    /// Overlays every setting present in the file onto `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigFileError::InvalidAddress`] if `relay.bind` does not
    /// parse as an IP address.
    pub fn apply_to(&self, config: &mut RelayConfig) -> Result<(), ConfigFileError> {
        let relay = &self.relay;
        if let Some(bind) = &relay.bind {
            let ip: IpAddr = bind
                .parse()
                .map_err(|_| ConfigFileError::InvalidAddress(bind.clone()))?;
            config.listen_addr = SocketAddr::new(ip, config.listen_addr.port());
        }
        if let Some(port) = relay.port {
            config.listen_addr.set_port(port);
        }
        if let Some(path) = &relay.path {
            config.path = path.clone();
        }
        if let Some(level) = &relay.log_level {
            config.log_level = level.clone();
        }
        if let Some(secs) = relay.handshake_timeout_secs {
            config.handshake_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = relay.shutdown_grace_secs {
            config.shutdown_grace = Duration::from_secs(secs);
        }

        let heartbeat = &self.heartbeat;
        if let Some(secs) = heartbeat.ping_interval_secs {
            config.heartbeat.ping_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = heartbeat.pong_timeout_secs {
            config.heartbeat.pong_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = heartbeat.ping_write_timeout_ms {
            config.heartbeat.ping_write_timeout = Duration::from_millis(ms);
        }

        let limits = &self.limits;
        if let Some(bytes) = limits.max_text_bytes {
            config.max_text_bytes = bytes;
        }
        if let Some(max) = limits.max_connections {
            config.max_connections = Some(max);
        }
        if let Some(ms) = limits.send_timeout_ms {
            config.send_timeout = Duration::from_millis(ms);
        }
        if let Some(capacity) = limits.outbound_queue {
            config.outbound_capacity = capacity;
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_file_changes_nothing() {
        // Arrange
        let file = parse_config_str("").unwrap();
        let mut config = RelayConfig::default();

        // Act
        file.apply_to(&mut config).unwrap();

        // Assert
        assert_eq!(config, RelayConfig::default());
    }

    #[test]
    fn test_partial_file_overrides_only_given_keys() {
        // Arrange
        let file = parse_config_str(
            r#"
            [relay]
            port = 9000

            [heartbeat]
            pong_timeout_secs = 45
            "#,
        )
        .unwrap();
        let mut config = RelayConfig::default();

        // Act
        file.apply_to(&mut config).unwrap();

        // Assert
        assert_eq!(config.listen_addr.port(), 9000);
        assert_eq!(config.listen_addr.ip().to_string(), "0.0.0.0");
        assert_eq!(config.heartbeat.pong_timeout, Duration::from_secs(45));
        assert_eq!(config.heartbeat.ping_interval, Duration::from_secs(10));
    }

    #[test]
    fn test_full_file_sets_every_field() {
        let file = parse_config_str(
            r#"
            [relay]
            bind = "127.0.0.1"
            port = 7000
            path = "/clip"
            log_level = "debug"
            handshake_timeout_secs = 3
            shutdown_grace_secs = 2

            [heartbeat]
            ping_interval_secs = 5
            pong_timeout_secs = 12
            ping_write_timeout_ms = 250

            [limits]
            max_text_bytes = 4096
            max_connections = 8
            send_timeout_ms = 750
            outbound_queue = 16
            "#,
        )
        .unwrap();
        let mut config = RelayConfig::default();

        file.apply_to(&mut config).unwrap();

        assert_eq!(config.listen_addr, "127.0.0.1:7000".parse().unwrap());
        assert_eq!(config.path, "/clip");
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.handshake_timeout, Duration::from_secs(3));
        assert_eq!(config.shutdown_grace, Duration::from_secs(2));
        assert_eq!(config.heartbeat.ping_interval, Duration::from_secs(5));
        assert_eq!(config.heartbeat.pong_timeout, Duration::from_secs(12));
        assert_eq!(
            config.heartbeat.ping_write_timeout,
            Duration::from_millis(250)
        );
        assert_eq!(config.max_text_bytes, 4096);
        assert_eq!(config.max_connections, Some(8));
        assert_eq!(config.send_timeout, Duration::from_millis(750));
        assert_eq!(config.outbound_capacity, 16);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let result = parse_config_str("[relay]\nprot = 9000\n");
        assert!(matches!(result, Err(ConfigFileError::Parse(_))));
    }

    #[test]
    fn test_invalid_bind_address_is_reported() {
        let file = parse_config_str("[relay]\nbind = \"not-an-ip\"\n").unwrap();
        let mut config = RelayConfig::default();
        assert!(matches!(
            file.apply_to(&mut config),
            Err(ConfigFileError::InvalidAddress(addr)) if addr == "not-an-ip"
        ));
    }

    #[test]
    fn test_load_config_file_reads_from_disk() {
        // Arrange
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[limits]\nmax_connections = 3").unwrap();

        // Act
        let loaded = load_config_file(file.path()).unwrap();

        // Assert
        assert_eq!(loaded.limits.max_connections, Some(3));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_config_file(&dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ConfigFileError::Io { .. })));
    }
}

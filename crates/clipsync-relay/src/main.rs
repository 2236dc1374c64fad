//! clipsync relay: entry point.
//!
//! Accepts WebSocket connections from clipsync clients and forwards every
//! clipboard update to all other connected clients.
//!
//! # Usage
//!
//! ```text
//! clipsync-relay [OPTIONS]
//!
//! Options:
//!   -c, --config <FILE>          TOML configuration file
//!       --bind <IP>              Address to listen on [default: 0.0.0.0]
//!       --port <PORT>            Port to listen on [default: 8080]
//!       --path <PATH>            WebSocket upgrade path [default: /]
//!       --ping-interval <SECS>   Heartbeat ping interval [default: 10]
//!       --pong-timeout <SECS>    Silence before a peer is dropped [default: 30]
//!       --max-text-bytes <N>     Largest clipboard payload [default: 1048576]
//!       --max-connections <N>    Connection limit [default: unlimited]
//!       --log-level <FILTER>     Log filter when RUST_LOG is unset [default: info]
//! ```
//!
//! # Configuration precedence
//!
//! Built-in defaults, then the `--config` file, then flags and environment
//! variables.  A flag wins over its environment variable.
//!
//! | Variable                 | Flag                |
//! |--------------------------|---------------------|
//! | `CLIPSYNC_CONFIG`        | `--config`          |
//! | `CLIPSYNC_BIND`          | `--bind`            |
//! | `CLIPSYNC_PORT`          | `--port`            |
//! | `CLIPSYNC_PATH`          | `--path`            |
//! | `CLIPSYNC_PING_INTERVAL` | `--ping-interval`   |
//! | `CLIPSYNC_PONG_TIMEOUT`  | `--pong-timeout`    |
//! | `CLIPSYNC_MAX_TEXT_BYTES`| `--max-text-bytes`  |
//! | `CLIPSYNC_MAX_CONNECTIONS` | `--max-connections` |
//! | `CLIPSYNC_LOG_LEVEL`     | `--log-level`       |

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use clipsync_relay::domain::RelayConfig;
use clipsync_relay::infrastructure::{load_config_file, run_server};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// clipsync relay server.
///
/// Every option is an override: when absent, the value comes from the config
/// file, or from the built-in default.
#[derive(Debug, Default, Parser)]
#[command(
    name = "clipsync-relay",
    about = "WebSocket relay that keeps clipboards in sync across machines",
    version
)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long, env = "CLIPSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// IP address to listen on.  `0.0.0.0` accepts connections on every
    /// interface, `127.0.0.1` only local ones.
    #[arg(long, env = "CLIPSYNC_BIND")]
    bind: Option<IpAddr>,

    /// TCP port to listen on.
    #[arg(long, env = "CLIPSYNC_PORT")]
    port: Option<u16>,

    /// HTTP path at which WebSocket upgrades are accepted.
    #[arg(long, env = "CLIPSYNC_PATH")]
    path: Option<String>,

    /// Seconds between heartbeat pings.
    #[arg(long, env = "CLIPSYNC_PING_INTERVAL")]
    ping_interval: Option<u64>,

    /// Seconds without a pong before a peer is dropped.  Must exceed the
    /// ping interval.
    #[arg(long, env = "CLIPSYNC_PONG_TIMEOUT")]
    pong_timeout: Option<u64>,

    /// Largest accepted clipboard payload in bytes.
    #[arg(long, env = "CLIPSYNC_MAX_TEXT_BYTES")]
    max_text_bytes: Option<usize>,

    /// Maximum number of simultaneously connected clients.
    #[arg(long, env = "CLIPSYNC_MAX_CONNECTIONS")]
    max_connections: Option<usize>,

    /// `tracing` filter used when `RUST_LOG` is not set.
    #[arg(long, env = "CLIPSYNC_LOG_LEVEL")]
    log_level: Option<String>,
}

impl Cli {
    /// Builds the effective [`RelayConfig`]: defaults, then the config file,
    /// then these overrides.  The result is validated.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be loaded or the merged
    /// configuration is invalid.
    fn into_relay_config(self) -> anyhow::Result<RelayConfig> {
        let mut config = RelayConfig::default();

        if let Some(path) = &self.config {
            load_config_file(path)
                .and_then(|file| file.apply_to(&mut config))
                .with_context(|| format!("failed to load config file {}", path.display()))?;
        }

        if let Some(ip) = self.bind {
            config.listen_addr = SocketAddr::new(ip, config.listen_addr.port());
        }
        if let Some(port) = self.port {
            config.listen_addr.set_port(port);
        }
        if let Some(path) = self.path {
            config.path = path;
        }
        if let Some(secs) = self.ping_interval {
            config.heartbeat.ping_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = self.pong_timeout {
            config.heartbeat.pong_timeout = Duration::from_secs(secs);
        }
        if let Some(bytes) = self.max_text_bytes {
            config.max_text_bytes = bytes;
        }
        if let Some(max) = self.max_connections {
            config.max_connections = Some(max);
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }

        config.validate().context("invalid relay configuration")?;
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Cli::parse().into_relay_config()?;

    // `RUST_LOG` wins; otherwise use the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(&config.log_level))
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(
        "clipsync relay starting: listen={}, path={}, ping={:?}, pong timeout={:?}",
        config.listen_addr,
        config.path,
        config.heartbeat.ping_interval,
        config.heartbeat.pong_timeout
    );

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, shutting down");
                on_signal.cancel();
            }
            Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
        }
    });

    run_server(config, shutdown)
        .await
        .context("relay server failed")?;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["clipsync-relay"];
        argv.extend_from_slice(args);
        Cli::parse_from(argv)
    }

    #[test]
    fn test_no_arguments_gives_default_config() {
        // Arrange: build the struct directly so CLIPSYNC_* variables in the
        // test environment cannot leak in
        let cli = Cli::default();

        // Act
        let config = cli.into_relay_config().unwrap();

        // Assert
        assert_eq!(config, RelayConfig::default());
    }

    #[test]
    fn test_port_and_bind_override() {
        let config = parse(&["--bind", "127.0.0.1", "--port", "9999"])
            .into_relay_config()
            .unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:9999".parse().unwrap());
    }

    #[test]
    fn test_heartbeat_overrides() {
        let config = parse(&["--ping-interval", "5", "--pong-timeout", "20"])
            .into_relay_config()
            .unwrap();
        assert_eq!(config.heartbeat.ping_interval, Duration::from_secs(5));
        assert_eq!(config.heartbeat.pong_timeout, Duration::from_secs(20));
    }

    #[test]
    fn test_pong_timeout_not_above_interval_is_rejected() {
        let result = parse(&["--ping-interval", "30", "--pong-timeout", "30"]).into_relay_config();
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_bind_is_rejected_by_parser() {
        let result = Cli::try_parse_from(["clipsync-relay", "--bind", "not.an.ip"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_flags_override_config_file() {
        // Arrange
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[relay]\nport = 7000\npath = \"/clip\"").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        // Act
        let config = parse(&["--config", &path, "--port", "7100"])
            .into_relay_config()
            .unwrap();

        // Assert: port from the flag, path from the file
        assert_eq!(config.listen_addr.port(), 7100);
        assert_eq!(config.path, "/clip");
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        let cli = Cli {
            config: Some(missing),
            ..Cli::default()
        };
        assert!(cli.into_relay_config().is_err());
    }

    #[test]
    fn test_max_connections_override() {
        let config = parse(&["--max-connections", "4"])
            .into_relay_config()
            .unwrap();
        assert_eq!(config.max_connections, Some(4));
    }
}

//! clipsync client: entry point.
//!
//! Reads clipboard changes as lines on stdin and prints updates from other
//! machines as lines on stdout.  Logs go to stderr so they never mix with
//! clipboard output.
//!
//! # Usage
//!
//! ```text
//! clipsync-client [OPTIONS]
//!
//! Options:
//!   --relay-url <URL>        Relay WebSocket URL [default: ws://127.0.0.1:8080/]
//!   --reconnect-secs <SECS>  Pause before reconnecting [default: 5]
//!   --max-text-bytes <N>     Largest clipboard text to send [default: 1048576]
//!   --log-level <FILTER>     Log filter when RUST_LOG is unset [default: info]
//! ```
//!
//! | Variable                  | Default                |
//! |---------------------------|------------------------|
//! | `CLIPSYNC_RELAY_URL`      | `ws://127.0.0.1:8080/` |
//! | `CLIPSYNC_RECONNECT_SECS` | `5`                    |
//! | `CLIPSYNC_MAX_TEXT_BYTES` | `1048576`              |
//! | `CLIPSYNC_LOG_LEVEL`      | `info`                 |

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use clipsync_client::domain::ClientConfig;
use clipsync_client::infrastructure::clipboard::TerminalClipboard;
use clipsync_client::infrastructure::run_client;
use clipsync_core::DEFAULT_MAX_TEXT_BYTES;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// clipsync client.
#[derive(Debug, Parser)]
#[command(
    name = "clipsync-client",
    about = "Keeps this machine's clipboard in sync through a clipsync relay",
    version
)]
struct Cli {
    /// WebSocket URL of the relay.
    #[arg(long, default_value = "ws://127.0.0.1:8080/", env = "CLIPSYNC_RELAY_URL")]
    relay_url: String,

    /// Seconds to wait before reconnecting after the relay goes away.
    #[arg(long, default_value_t = 5, env = "CLIPSYNC_RECONNECT_SECS")]
    reconnect_secs: u64,

    /// Largest clipboard text to send, in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_TEXT_BYTES, env = "CLIPSYNC_MAX_TEXT_BYTES")]
    max_text_bytes: usize,

    /// `tracing` filter used when `RUST_LOG` is not set.
    #[arg(long, default_value = "info", env = "CLIPSYNC_LOG_LEVEL")]
    log_level: String,
}

impl Cli {
    /// Converts the parsed arguments into a validated [`ClientConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if the resulting configuration is invalid.
    fn into_client_config(self) -> anyhow::Result<ClientConfig> {
        let config = ClientConfig {
            relay_url: self.relay_url,
            reconnect_interval: Duration::from_secs(self.reconnect_secs),
            max_text_bytes: self.max_text_bytes,
            ..ClientConfig::default()
        };
        config.validate().context("invalid client configuration")?;
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(&cli.log_level))
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = cli.into_client_config()?;
    info!("clipsync client starting; relay={}", config.relay_url);

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

    let bridge = Arc::new(TerminalClipboard::stdio());
    run_client(config, bridge, shutdown)
        .await
        .context("clipsync client failed")?;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["clipsync-client"]);
        assert_eq!(cli.relay_url, "ws://127.0.0.1:8080/");
        assert_eq!(cli.reconnect_secs, 5);
        assert_eq!(cli.max_text_bytes, 1024 * 1024);
    }

    #[test]
    fn test_into_client_config_applies_overrides() {
        // Arrange
        let cli = Cli::parse_from([
            "clipsync-client",
            "--relay-url",
            "ws://10.0.0.5:9000/clip",
            "--reconnect-secs",
            "2",
        ]);

        // Act
        let config = cli.into_client_config().unwrap();

        // Assert
        assert_eq!(config.relay_url, "ws://10.0.0.5:9000/clip");
        assert_eq!(config.reconnect_interval, Duration::from_secs(2));
    }

    #[test]
    fn test_into_client_config_rejects_non_websocket_url() {
        let cli = Cli {
            relay_url: "10.0.0.5:8080".into(),
            reconnect_secs: 5,
            max_text_bytes: 16,
            log_level: "info".into(),
        };
        assert!(cli.into_client_config().is_err());
    }

    #[test]
    fn test_into_client_config_rejects_zero_reconnect() {
        let cli = Cli {
            relay_url: "ws://127.0.0.1:8080/".into(),
            reconnect_secs: 0,
            max_text_bytes: 16,
            log_level: "info".into(),
        };
        assert!(cli.into_client_config().is_err());
    }
}

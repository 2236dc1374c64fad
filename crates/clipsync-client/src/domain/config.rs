//! Client configuration.

use std::time::Duration;

use clipsync_core::{relay_url, DEFAULT_MAX_TEXT_BYTES, DEFAULT_PATH, DEFAULT_PORT};
use thiserror::Error;

/// A client configuration that cannot be used.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The relay URL is not a `ws://` or `wss://` URL.
    #[error("relay URL must start with ws:// or wss://, got {0:?}")]
    InvalidRelayUrl(String),

    /// A duration setting is zero.
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    /// The size limit is zero.
    #[error("max text bytes must be greater than zero")]
    ZeroLimit,
}

/// Runtime settings for one client process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// WebSocket URL of the relay.
    pub relay_url: String,

    /// Pause between a lost connection and the next attempt.
    pub reconnect_interval: Duration,

    /// Upper bound on the TCP connect plus WebSocket upgrade.
    pub connect_timeout: Duration,

    /// Deadline for writing one frame to the relay.  A relay that stops
    /// reading is treated as gone.
    pub write_timeout: Duration,

    /// Largest clipboard text the client will send, in UTF-8 bytes.  Must not
    /// exceed the relay's limit or oversized updates are dropped there.
    pub max_text_bytes: usize,
}

impl Default for ClientConfig {
    /// | Field              | Default                |
    /// |--------------------|------------------------|
    /// | relay_url          | `ws://127.0.0.1:8080/` |
    /// | reconnect_interval | 5 s                    |
    /// | connect_timeout    | 10 s                   |
    /// | write_timeout      | 5 s                    |
    /// | max_text_bytes     | 1 MiB                  |
    fn default() -> Self {
        Self {
            relay_url: relay_url("127.0.0.1", DEFAULT_PORT, DEFAULT_PATH),
            reconnect_interval: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(5),
            max_text_bytes: DEFAULT_MAX_TEXT_BYTES,
        }
    }
}

impl ClientConfig {
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.relay_url.starts_with("ws://") || self.relay_url.starts_with("wss://")) {
            return Err(ConfigError::InvalidRelayUrl(self.relay_url.clone()));
        }
        if self.reconnect_interval.is_zero() {
            return Err(ConfigError::ZeroDuration("reconnect interval"));
        }
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("connect timeout"));
        }
        if self.write_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("write timeout"));
        }
        if self.max_text_bytes == 0 {
            return Err(ConfigError::ZeroLimit);
        }
        Ok(())
    }
}

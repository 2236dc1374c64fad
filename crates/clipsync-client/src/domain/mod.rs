//! Domain layer for clipsync-client: configuration only.

pub mod config;

pub use config::{ClientConfig, ConfigError};

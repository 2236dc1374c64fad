//! Default relay endpoint.

/// TCP port the relay listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 8080;

/// HTTP path at which the relay accepts WebSocket upgrades.
pub const DEFAULT_PATH: &str = "/";

/// Builds the `ws://` URL a client dials to reach a relay.
///
/// A missing leading slash on `path` is added.
///
/// ```rust
/// use clipsync_core::relay_url;
///
/// assert_eq!(relay_url("127.0.0.1", 8080, "/"), "ws://127.0.0.1:8080/");
/// assert_eq!(relay_url("relay.lan", 9000, "sync"), "ws://relay.lan:9000/sync");
/// ```
pub fn relay_url(host: &str, port: u16, path: &str) -> String {
    if path.starts_with('/') {
        format!("ws://{host}:{port}{path}")
    } else {
        format!("ws://{host}:{port}/{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_url_matches_default_port_and_path() {
        assert_eq!(
            relay_url("127.0.0.1", DEFAULT_PORT, DEFAULT_PATH),
            "ws://127.0.0.1:8080/"
        );
    }

    #[test]
    fn test_relative_path_gets_leading_slash() {
        assert_eq!(relay_url("h", 1, "x/y"), "ws://h:1/x/y");
    }
}

//! `[serve]` section configuration.
//!
//! Contains HTTP front end settings.
//!
//! # Example
//!
//! ```toml
//! [serve]
//! interface = "127.0.0.1"        # Network interface (127.0.0.1 = localhost only)
//! port = 5278                    # HTTP port number
//! watch = true                   # Re-open the archive when it changes on disk
//! transform_timeout_ms = 10000   # Give up on a document transform after this long
//! ```
//!
//! Use `interface = "0.0.0.0"` to make the server accessible from LAN.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// HTTP front end settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServeConfig {
    /// Network interface to bind.
    /// - `127.0.0.1` (default): localhost only
    /// - `0.0.0.0`: all interfaces (LAN accessible)
    pub interface: IpAddr,

    /// HTTP port number.
    pub port: u16,

    /// Watch the archive directory and switch to the new contents on change.
    pub watch: bool,

    /// Upper bound for a proxied document transform.
    pub transform_timeout_ms: u64,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            interface: IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            port: 5278,
            watch: true,
            transform_timeout_ms: 10_000,
        }
    }
}

impl ServeConfig {
    pub fn transform_timeout(&self) -> Duration {
        Duration::from_millis(self.transform_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
    use std::time::Duration;

    use crate::config::test_parse_config;

    #[test]
    fn test_serve_config() {
        let config =
            test_parse_config("[serve]\ninterface = \"0.0.0.0\"\nport = 8080\nwatch = false");

        assert_eq!(
            config.serve.interface,
            IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0))
        );
        assert_eq!(config.serve.port, 8080);
        assert!(!config.serve.watch);
    }

    #[test]
    fn test_serve_config_defaults() {
        let config = test_parse_config("");

        assert_eq!(
            config.serve.interface,
            IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
        );
        assert_eq!(config.serve.port, 5278);
        assert!(config.serve.watch);
        assert_eq!(config.serve.transform_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_serve_config_ipv6() {
        let config = test_parse_config("[serve]\ninterface = \"::1\"");
        assert_eq!(
            config.serve.interface,
            IpAddr::V6(Ipv6Addr::new(0, 0, 0, 0, 0, 0, 0, 1))
        );
    }

    #[test]
    fn test_serve_config_partial_override() {
        let config = test_parse_config("[serve]\ntransform_timeout_ms = 250");

        assert_eq!(config.serve.transform_timeout(), Duration::from_millis(250));
        assert_eq!(config.serve.port, 5278);
        assert!(config.serve.watch);
    }
}

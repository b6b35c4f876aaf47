//! Connection configuration.

use std::time::Duration;
use stompwire_protocol::{DEFAULT_PORT, MAX_FRAME_SIZE, PROTOCOL_VERSION};

/// Default read buffer size (8 KiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;

/// Minimum read buffer size (1 KiB).
pub const MIN_READ_BUFFER_SIZE: usize = 1024;

/// Maximum read buffer size (1 MiB).
pub const MAX_READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Default prefix prepended to subscription names on the wire.
pub const DEFAULT_DESTINATION_PREFIX: &str = "/topic/";

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Broker host name or address.
    pub host: String,
    /// Broker port.
    pub port: u16,
    /// Login sent in CONNECT.
    pub login: String,
    /// Password sent in CONNECT.
    pub password: String,
    /// Value of the `accept-version` header.
    pub accept_version: String,
    /// Value of the `host` header (defaults to `host`).
    pub virtual_host: Option<String>,
    /// Prefix joining subscription names to wire destinations.
    pub destination_prefix: String,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Bound on the CONNECTED and RECEIPT waits. `None` waits forever.
    pub handshake_timeout: Option<Duration>,
    /// Read buffer size for socket reads.
    pub read_buffer_size: usize,
    /// Largest incomplete frame the decoder will buffer.
    pub max_frame_size: usize,
}

impl ConnectionConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            login: String::new(),
            password: String::new(),
            accept_version: PROTOCOL_VERSION.to_string(),
            virtual_host: None,
            destination_prefix: DEFAULT_DESTINATION_PREFIX.to_string(),
            connect_timeout: Duration::from_secs(10),
            handshake_timeout: Some(Duration::from_secs(30)),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            max_frame_size: MAX_FRAME_SIZE,
        }
    }

    pub fn with_credentials(mut self, login: impl Into<String>, password: impl Into<String>) -> Self {
        self.login = login.into();
        self.password = password.into();
        self
    }

    pub fn with_virtual_host(mut self, vhost: impl Into<String>) -> Self {
        self.virtual_host = Some(vhost.into());
        self
    }

    pub fn with_destination_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.destination_prefix = prefix.into();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.clamp(MIN_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE);
        self
    }

    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Returns the `host` header value for CONNECT.
    pub fn host_header(&self) -> &str {
        self.virtual_host.as_deref().unwrap_or(&self.host)
    }

    /// Joins a subscription name to its wire destination.
    pub fn wire_destination(&self, name: &str) -> String {
        format!("{}{}", self.destination_prefix, name)
    }

}

/// Strips `prefix` from an inbound destination. Destinations without the
/// prefix are returned unchanged.
pub fn strip_destination_prefix<'a>(prefix: &str, destination: &'a str) -> &'a str {
    destination.strip_prefix(prefix).unwrap_or(destination)
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new("127.0.0.1", DEFAULT_PORT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ConnectionConfig::default();
        assert_eq!(config.port, 61613);
        assert_eq!(config.accept_version, "1.2");
        assert_eq!(config.read_buffer_size, DEFAULT_READ_BUFFER_SIZE);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.handshake_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.host_header(), "127.0.0.1");
    }

    #[test]
    fn test_config_buffer_clamping() {
        let config = ConnectionConfig::default().with_read_buffer_size(100);
        assert_eq!(config.read_buffer_size, MIN_READ_BUFFER_SIZE);

        let config = ConnectionConfig::default().with_read_buffer_size(10 * 1024 * 1024);
        assert_eq!(config.read_buffer_size, MAX_READ_BUFFER_SIZE);
    }

    #[test]
    fn test_virtual_host_overrides_host_header() {
        let config = ConnectionConfig::new("broker.internal", 61613).with_virtual_host("/prod");
        assert_eq!(config.host_header(), "/prod");
    }

    #[test]
    fn test_destination_prefix() {
        let config = ConnectionConfig::default();
        assert_eq!(config.wire_destination("prices"), "/topic/prices");

        let config = config.with_destination_prefix("/queue/");
        assert_eq!(config.wire_destination("jobs"), "/queue/jobs");
    }

    #[test]
    fn test_strip_destination_prefix() {
        assert_eq!(strip_destination_prefix("/topic/", "/topic/prices"), "prices");
        assert_eq!(strip_destination_prefix("/topic/", "/queue/jobs"), "/queue/jobs");
        assert_eq!(strip_destination_prefix("/queue/", "/queue/jobs"), "jobs");
        assert_eq!(strip_destination_prefix("", "/topic/a"), "/topic/a");
    }
}

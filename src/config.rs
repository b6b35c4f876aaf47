//! Client configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via STOMPWIRE_CONFIG or --config)
//! 3. Environment variables
//! 4. Command-line flags

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use stompwire_client::ConnectionConfig;
use thiserror::Error;

/// Client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Broker connection settings.
    pub broker: BrokerConfig,
    /// Timeouts.
    pub timeouts: TimeoutConfig,
    /// Buffer limits.
    pub limits: LimitsConfig,
}

impl Config {
    /// Loads configuration from `path` (or STOMPWIRE_CONFIG), then applies
    /// environment variable overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("STOMPWIRE_CONFIG").ok().map(PathBuf::from));

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    /// Applies overrides looked up by variable name.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("STOMPWIRE_HOST") {
            self.broker.host = host;
        }

        if let Some(port) = lookup("STOMPWIRE_PORT") {
            if let Ok(parsed) = port.parse() {
                self.broker.port = parsed;
            }
        }

        if let Some(login) = lookup("STOMPWIRE_LOGIN") {
            self.broker.login = login;
        }

        if let Some(password) = lookup("STOMPWIRE_PASSWORD") {
            self.broker.password = password;
        }

        if let Some(prefix) = lookup("STOMPWIRE_PREFIX") {
            self.broker.destination_prefix = prefix;
        }
    }

    /// Builds the client connection config.
    pub fn to_connection_config(&self) -> ConnectionConfig {
        let mut config = ConnectionConfig::new(self.broker.host.as_str(), self.broker.port)
            .with_credentials(self.broker.login.as_str(), self.broker.password.as_str())
            .with_destination_prefix(self.broker.destination_prefix.as_str())
            .with_connect_timeout(Duration::from_secs(self.timeouts.connect_secs))
            .with_handshake_timeout(self.timeouts.handshake_secs.map(Duration::from_secs))
            .with_read_buffer_size(self.limits.read_buffer_size)
            .with_max_frame_size(self.limits.max_frame_size);

        if let Some(ref vhost) = self.broker.virtual_host {
            config = config.with_virtual_host(vhost.as_str());
        }
        config
    }
}

/// Broker connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub login: String,
    pub password: String,
    /// `host` header override.
    pub virtual_host: Option<String>,
    pub destination_prefix: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: stompwire_protocol::DEFAULT_PORT,
            login: String::new(),
            password: String::new(),
            virtual_host: None,
            destination_prefix: stompwire_client::connection::DEFAULT_DESTINATION_PREFIX
                .to_string(),
        }
    }
}

/// Timeouts in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// TCP connect timeout.
    pub connect_secs: u64,
    /// CONNECTED and RECEIPT wait. `null` waits forever.
    pub handshake_secs: Option<u64>,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 10,
            handshake_secs: Some(30),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub read_buffer_size: usize,
    pub max_frame_size: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: stompwire_client::connection::DEFAULT_READ_BUFFER_SIZE,
            max_frame_size: stompwire_protocol::MAX_FRAME_SIZE,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {}", .0.display(), .1)]
    IoError(PathBuf, std::io::Error),

    #[error("failed to parse config file '{}': {}", .0.display(), .1)]
    ParseError(PathBuf, String),
}

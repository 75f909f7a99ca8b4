//! Configuration
//!
//! Configuration structures for server and client.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::callback::CallbackAddress;

pub const DEFAULT_SERVER_PORT: u16 = 10010;
pub const DEFAULT_CLIENT_PORT: u16 = 11000;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_host")]
    pub host: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
    #[serde(default = "default_liveness_interval_ms")]
    pub liveness_interval_ms: u64,
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_bind_host() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    DEFAULT_SERVER_PORT
}

fn default_liveness_interval_ms() -> u64 {
    2000
}

fn default_call_timeout_ms() -> u64 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_bind_host(),
            port: DEFAULT_SERVER_PORT,
            liveness_interval_ms: default_liveness_interval_ms(),
            call_timeout_ms: default_call_timeout_ms(),
            log_level: default_log_level(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.liveness_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "liveness_interval_ms must be positive".to_string(),
            ));
        }
        if self.call_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "call_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn liveness_interval(&self) -> Duration {
        Duration::from_millis(self.liveness_interval_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_server_host")]
    pub server_host: String,
    #[serde(default = "default_server_port")]
    pub server_port: u16,
    #[serde(default = "default_local_host")]
    pub local_host: String,
    #[serde(default = "default_client_port")]
    pub local_port: u16,
    #[serde(default = "default_username")]
    pub default_username: String,
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
    #[serde(default = "default_server_watch_interval_ms")]
    pub server_watch_interval_ms: u64,
    #[serde(default = "default_server_grace_secs")]
    pub server_grace_secs: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_local_host() -> String {
    "127.0.0.1".to_string()
}

fn default_client_port() -> u16 {
    DEFAULT_CLIENT_PORT
}

fn default_username() -> String {
    "Bob".to_string()
}

fn default_server_watch_interval_ms() -> u64 {
    5000
}

fn default_server_grace_secs() -> u64 {
    60
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_host: default_server_host(),
            server_port: DEFAULT_SERVER_PORT,
            local_host: default_local_host(),
            local_port: DEFAULT_CLIENT_PORT,
            default_username: default_username(),
            call_timeout_ms: default_call_timeout_ms(),
            server_watch_interval_ms: default_server_watch_interval_ms(),
            server_grace_secs: default_server_grace_secs(),
            log_level: default_log_level(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// The client's endpoint must not collide with the server's address.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_port == self.local_port && self.server_host == self.local_host {
            return Err(ConfigError::Invalid(
                "server and local endpoint addresses must be different".to_string(),
            ));
        }
        if self.call_timeout_ms == 0 || self.server_watch_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "timeouts and intervals must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn server_address(&self) -> CallbackAddress {
        CallbackAddress::new(self.server_host.clone(), self.server_port)
    }

    pub fn local_address(&self) -> CallbackAddress {
        CallbackAddress::new(self.local_host.clone(), self.local_port)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn server_watch_interval(&self) -> Duration {
        Duration::from_millis(self.server_watch_interval_ms)
    }

    pub fn server_grace(&self) -> Duration {
        Duration::from_secs(self.server_grace_secs)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

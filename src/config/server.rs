//! Proxy configuration types
//!
//! Defines the listener, authentication and filter sections of the
//! configuration file.

use super::TcpConfig;
use serde::{Deserialize, Serialize};

/// Default listen address
fn default_listen_addr() -> String {
    "0.0.0.0".to_string()
}

/// Default listen port
fn default_port() -> u16 {
    1080
}

/// Default classification timeout in seconds
fn default_classify_timeout() -> u64 {
    5
}

/// Default target connect timeout in seconds
fn default_connect_timeout() -> u64 {
    10
}

/// Root configuration structure
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct Config {
    /// Listener configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Proxy authentication
    #[serde(default)]
    pub auth: AuthConfig,

    /// Destination filter
    #[serde(default)]
    pub filter: FilterConfig,

    /// Outbound TCP options
    #[serde(default)]
    pub tcp: TcpConfig,
}

/// Listener configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to bind (e.g., "0.0.0.0" or "::")
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Port shared by SOCKS5 and HTTP
    #[serde(default = "default_port")]
    pub port: u16,

    /// Seconds a new connection may stay silent before it is dropped
    #[serde(default = "default_classify_timeout")]
    pub classify_timeout: u64,

    /// Seconds allowed for connecting to a target
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            port: default_port(),
            classify_timeout: default_classify_timeout(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

impl ServerConfig {
    /// `addr:port` string suitable for binding
    pub fn bind_addr(&self) -> String {
        if self.listen_addr.contains(':') && !self.listen_addr.starts_with('[') {
            format!("[{}]:{}", self.listen_addr, self.port)
        } else {
            format!("{}:{}", self.listen_addr, self.port)
        }
    }
}

/// Proxy authentication configuration
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct AuthConfig {
    /// Username clients must present
    #[serde(default)]
    pub username: Option<String>,

    /// Password clients must present
    #[serde(default)]
    pub password: Option<String>,
}

/// Destination filter configuration
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct FilterConfig {
    /// Glob pattern destinations must match (e.g., "*.example.com")
    #[serde(default)]
    pub allowed_dest_fqdn: Option<String>,
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("Listen port must be non-zero".to_string());
        }
        if self.server.listen_addr.trim().is_empty() {
            return Err("Listen address must not be empty".to_string());
        }
        if self.server.classify_timeout == 0 {
            return Err("classify_timeout must be at least 1 second".to_string());
        }
        if self.server.connect_timeout == 0 {
            return Err("connect_timeout must be at least 1 second".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.listen_addr, "0.0.0.0");
        assert_eq!(config.port, 1080);
        assert_eq!(config.classify_timeout, 5);
        assert_eq!(config.connect_timeout, 10);
    }

    #[test]
    fn test_bind_addr() {
        let mut config = ServerConfig::default();
        assert_eq!(config.bind_addr(), "0.0.0.0:1080");

        config.listen_addr = "::".to_string();
        config.port = 8080;
        assert_eq!(config.bind_addr(), "[::]:8080");
    }

    #[test]
    fn test_config_validate() {
        assert!(Config::default().validate().is_ok());

        let mut config = Config::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.server.classify_timeout = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.server.connect_timeout = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.server.listen_addr = " ".to_string();
        assert!(config.validate().is_err());
    }
}

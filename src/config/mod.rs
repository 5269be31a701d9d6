//! Configuration module for Mixproxy
//!
//! This module provides configuration types, TOML parsing and the
//! command-line/environment overrides applied on top of a file.

mod server;
mod transport;

pub use server::{AuthConfig, Config, FilterConfig, ServerConfig};
pub use transport::TcpConfig;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

    parse_config(&content)
}

/// Parse configuration from a TOML string
pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse configuration")
}

/// Values supplied on the command line or through the environment.
///
/// Every field left `None` keeps the value from the file (or the default).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    /// Listen port
    pub port: Option<u16>,
    /// Proxy username
    pub username: Option<String>,
    /// Proxy password
    pub password: Option<String>,
    /// Destination allow pattern
    pub allowed_dest_fqdn: Option<String>,
}

impl ConfigOverrides {
    /// Apply the overrides onto `config`
    pub fn apply(self, config: &mut Config) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(username) = self.username {
            config.auth.username = Some(username);
        }
        if let Some(password) = self.password {
            config.auth.password = Some(password);
        }
        if let Some(pattern) = self.allowed_dest_fqdn {
            config.filter.allowed_dest_fqdn = Some(pattern);
        }
    }
}

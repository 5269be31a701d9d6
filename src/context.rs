//! Shared per-process state handed to both protocol engines
//!
//! Built once from the configuration before the first accept and never
//! mutated afterwards, so engines share it through an `Arc` without locking.

use crate::config::Config;
use crate::policy::{Credentials, DestinationFilter, Policy};
use crate::transport::TcpTransport;
use std::time::Duration;

/// Read-only state consulted by every connection handler
#[derive(Debug, Clone, Default)]
pub struct ProxyContext {
    /// Credentials and destination filter
    pub policy: Policy,
    /// Dialer for proxy targets
    pub transport: TcpTransport,
}

impl ProxyContext {
    /// Create a context from its parts
    pub fn new(policy: Policy, transport: TcpTransport) -> Self {
        Self { policy, transport }
    }

    /// Derive policy and dialer from the configuration
    pub fn from_config(config: &Config) -> Self {
        let credentials = Credentials::from_options(
            config.auth.username.as_deref(),
            config.auth.password.as_deref(),
        );
        let filter = DestinationFilter::new(config.filter.allowed_dest_fqdn.as_deref());
        let transport = TcpTransport::from_config(
            &config.tcp,
            Duration::from_secs(config.server.connect_timeout),
        );

        Self::new(Policy::new(credentials, filter), transport)
    }
}

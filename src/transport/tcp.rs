//! TCP dialer for proxy targets
//!
//! Resolves the destination and connects under a single overall timeout,
//! trying each resolved address in turn.

use super::SocketOpts;
use crate::config::TcpConfig;
use std::io;
use std::time::Duration;
use tokio::net::{lookup_host, TcpStream};

/// Default connection timeout in seconds
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Outbound TCP transport used by both engines
#[derive(Debug, Clone)]
pub struct TcpTransport {
    /// Socket options to apply to connections
    socket_opts: SocketOpts,
    /// Connection timeout
    connect_timeout: Duration,
}

impl TcpTransport {
    /// Create a new TCP transport with default options
    pub fn with_defaults() -> Self {
        TcpTransport {
            socket_opts: SocketOpts::default(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }

    /// Create a transport from the `[tcp]` section and a connect timeout
    pub fn from_config(config: &TcpConfig, connect_timeout: Duration) -> Self {
        Self::with_defaults()
            .with_socket_opts(SocketOpts::from_tcp_config(config))
            .with_connect_timeout(connect_timeout)
    }

    /// Set socket options
    pub fn with_socket_opts(mut self, opts: SocketOpts) -> Self {
        self.socket_opts = opts;
        self
    }

    /// Set connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Configured connection timeout
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Connect to `host:port`.
    ///
    /// A timeout is reported as [`io::ErrorKind::TimedOut`]; resolution
    /// failures keep the resolver's error.
    pub async fn connect(&self, host: &str, port: u16) -> io::Result<TcpStream> {
        let stream = tokio::time::timeout(self.connect_timeout, self.connect_any(host, port))
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connection to {}:{} timed out", host, port),
                )
            })??;

        if let Err(e) = self.socket_opts.apply(&stream) {
            tracing::warn!("Failed to apply socket options: {}", e);
        }

        tracing::debug!("TCP connection established to {}:{}", host, port);

        Ok(stream)
    }

    async fn connect_any(&self, host: &str, port: u16) -> io::Result<TcpStream> {
        let mut last_err = None;

        for addr in lookup_host((host, port)).await? {
            match TcpStream::connect(addr).await {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    tracing::debug!("Connect to {} failed: {}", addr, e);
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no addresses found for {}", host),
            )
        }))
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::with_defaults()
    }
}

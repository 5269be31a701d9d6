//! Parsed proxy request
//!
//! A [`ProxyRequest`] is the protocol-independent target of one proxy
//! operation, produced by either engine before any policy check or dial.

use crate::error::ProxyError;
use std::fmt;

/// Which protocol operation produced the request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// SOCKS5 CONNECT command
    Socks5Connect,
    /// HTTP CONNECT tunnel
    HttpConnect,
    /// Plain HTTP request forwarded by the proxy
    HttpForward,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestKind::Socks5Connect => write!(f, "socks5-connect"),
            RequestKind::HttpConnect => write!(f, "http-connect"),
            RequestKind::HttpForward => write!(f, "http-forward"),
        }
    }
}

/// Destination host, port and protocol variant. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRequest {
    host: String,
    port: u16,
    kind: RequestKind,
}

impl ProxyRequest {
    /// Build a request; port 0 is not a valid destination.
    ///
    /// IPv6 literals may be given with or without brackets; they are stored
    /// bare so the filter sees the same text from both engines.
    pub fn new(host: impl Into<String>, port: u16, kind: RequestKind) -> Result<Self, ProxyError> {
        if port == 0 {
            return Err(ProxyError::InvalidTarget(format!("port {}", port)));
        }

        let host = host.into();
        let host = match host.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
            Some(bare) => bare.to_string(),
            None => host,
        };

        if host.is_empty() {
            return Err(ProxyError::InvalidTarget("empty host".to_string()));
        }

        Ok(Self { host, port, kind })
    }

    /// Destination host (IP literal or FQDN)
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Destination port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Protocol variant
    pub fn kind(&self) -> RequestKind {
        self.kind
    }
}

impl fmt::Display for ProxyRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

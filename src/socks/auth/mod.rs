//! SOCKS5 authentication module
//!
//! Handles method negotiation and username/password authentication.

mod password;

pub use password::authenticate_password;

use super::consts::*;
use crate::error::Socks5Error;
use crate::policy::Credentials;
use anyhow::{bail, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Authentication method types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    /// No authentication required
    None,
    /// Username/password authentication
    Password,
}

impl AuthMethod {
    /// Convert to SOCKS5 method byte
    pub fn to_byte(self) -> u8 {
        match self {
            AuthMethod::None => SOCKS5_AUTH_METHOD_NONE,
            AuthMethod::Password => SOCKS5_AUTH_METHOD_PASSWORD,
        }
    }

    /// Parse from SOCKS5 method byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            SOCKS5_AUTH_METHOD_NONE => Some(AuthMethod::None),
            SOCKS5_AUTH_METHOD_PASSWORD => Some(AuthMethod::Password),
            _ => None,
        }
    }
}

/// Perform method negotiation and, when required, authentication
///
/// ```text
/// +----+----------+----------+
/// |VER | NMETHODS | METHODS  |
/// +----+----------+----------+
/// | 1  |    1     | 1 to 255 |
/// +----+----------+----------+
/// ```
///
/// The method is dictated by the configuration: password when credentials
/// are set, none otherwise. A client that does not offer it receives `0xFF`.
pub async fn authenticate<S>(stream: &mut S, credentials: &Credentials) -> Result<AuthMethod>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = [0u8; 2];
    stream.read_exact(&mut buf).await?;

    let version = buf[0];
    let num_methods = buf[1];

    if version != SOCKS5_VERSION {
        bail!(Socks5Error::UnsupportedVersion(version));
    }

    let mut methods = vec![0u8; num_methods as usize];
    stream.read_exact(&mut methods).await?;

    let selected_method = select_auth_method(&methods, credentials);

    stream
        .write_all(&[
            SOCKS5_VERSION,
            selected_method
                .map(|m| m.to_byte())
                .unwrap_or(SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE),
        ])
        .await?;
    stream.flush().await?;

    let method = match selected_method {
        Some(m) => m,
        None => bail!(Socks5Error::NoAcceptableMethod),
    };

    if method == AuthMethod::Password {
        authenticate_password(stream, credentials).await?;
    }

    Ok(method)
}

/// The one method the configuration requires, if the client offered it
fn select_auth_method(methods: &[u8], credentials: &Credentials) -> Option<AuthMethod> {
    let required = if credentials.is_enabled() {
        AuthMethod::Password
    } else {
        AuthMethod::None
    };

    methods
        .iter()
        .filter_map(|&byte| AuthMethod::from_byte(byte))
        .find(|&offered| offered == required)
}

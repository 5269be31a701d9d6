//! Username/password authentication handler
//!
//! Implements RFC 1929 username/password authentication for SOCKS5.

use crate::error::Socks5Error;
use crate::policy::Credentials;
use crate::socks::consts::{SOCKS5_AUTH_FAILURE, SOCKS5_AUTH_SUCCESS, SOCKS5_AUTH_VERSION};
use anyhow::{bail, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

/// Run the RFC 1929 sub-negotiation against the configured credentials
///
/// Client sends:
/// ```text
/// +----+------+----------+------+----------+
/// |VER | ULEN |  UNAME   | PLEN |  PASSWD  |
/// +----+------+----------+------+----------+
/// | 1  |  1   | 0 to 255 |  1   | 0 to 255 |
/// +----+------+----------+------+----------+
/// ```
///
/// Server responds with `VER STATUS`. Zero-length fields are accepted on the
/// wire because a configuration may leave one of the two fields empty. A
/// wrong sub-negotiation version aborts without a reply.
pub async fn authenticate_password<S>(stream: &mut S, credentials: &Credentials) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = [0u8; 2];
    stream.read_exact(&mut buf).await?;

    let version = buf[0];
    let username_len = buf[1] as usize;

    if version != SOCKS5_AUTH_VERSION {
        bail!("Invalid auth version: {}", version);
    }

    let mut username = vec![0u8; username_len];
    stream.read_exact(&mut username).await?;

    let mut buf = [0u8; 1];
    stream.read_exact(&mut buf).await?;
    let password_len = buf[0] as usize;

    let mut password = vec![0u8; password_len];
    stream.read_exact(&mut password).await?;

    let accepted = match (std::str::from_utf8(&username), std::str::from_utf8(&password)) {
        (Ok(username), Ok(password)) => credentials.authenticate(username, password),
        _ => false,
    };

    if accepted {
        send_auth_result(stream, SOCKS5_AUTH_SUCCESS).await?;
        debug!(
            "Authentication successful for user: {}",
            String::from_utf8_lossy(&username)
        );
        Ok(())
    } else {
        send_auth_result(stream, SOCKS5_AUTH_FAILURE).await?;
        warn!(
            "SOCKS5 authentication failed for user: {}",
            String::from_utf8_lossy(&username)
        );
        bail!(Socks5Error::AuthFailed);
    }
}

/// Send authentication result to client
async fn send_auth_result<S: AsyncWrite + Unpin>(stream: &mut S, status: u8) -> Result<()> {
    stream.write_all(&[SOCKS5_AUTH_VERSION, status]).await?;
    stream.flush().await?;
    Ok(())
}

//! SOCKS5 command parser
//!
//! Parses SOCKS5 command requests from the client.

use crate::error::Socks5Error;
use crate::socks::consts::*;
use crate::socks::types::{SocksCommand, TargetAddr};
use anyhow::{bail, Context, Result};
use std::net::{Ipv4Addr, Ipv6Addr};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Parse a SOCKS5 command from the stream
///
/// # SOCKS5 Request Format
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   | Variable |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
///
/// The whole request is consumed before the command byte is judged, so an
/// unknown command fails with [`Socks5Error::CommandNotSupported`] only after
/// a well-formed address. An unknown address type fails with
/// [`Socks5Error::AddressTypeNotSupported`] since its length is unknowable.
pub async fn parse_command<S>(stream: &mut S) -> Result<(SocksCommand, TargetAddr)>
where
    S: AsyncRead + Unpin,
{
    // Read: VER CMD RSV ATYP
    let mut header = [0u8; 4];
    stream
        .read_exact(&mut header)
        .await
        .with_context(|| "Failed to read command header")?;

    let version = header[0];
    let cmd_byte = header[1];
    let _reserved = header[2];
    let addr_type = header[3];

    if version != SOCKS5_VERSION {
        bail!(Socks5Error::UnsupportedVersion(version));
    }

    let target_addr = parse_address(stream, addr_type).await?;

    let command = match SocksCommand::from_byte(cmd_byte) {
        Some(command) => command,
        None => bail!(Socks5Error::CommandNotSupported(cmd_byte)),
    };

    tracing::debug!("Parsed SOCKS5 command: {} to {}", command, target_addr);

    Ok((command, target_addr))
}

/// Parse the address portion of a SOCKS5 request
async fn parse_address<S>(stream: &mut S, addr_type: u8) -> Result<TargetAddr>
where
    S: AsyncRead + Unpin,
{
    match addr_type {
        SOCKS5_ADDR_TYPE_IPV4 => {
            let mut addr = [0u8; 4];
            stream.read_exact(&mut addr).await?;
            let port = read_port(stream).await?;

            Ok(TargetAddr::ipv4(Ipv4Addr::from(addr), port))
        }

        SOCKS5_ADDR_TYPE_DOMAIN => {
            let mut len_buf = [0u8; 1];
            stream.read_exact(&mut len_buf).await?;
            let domain_len = len_buf[0] as usize;

            if domain_len == 0 {
                bail!(Socks5Error::InvalidDomain(String::new()));
            }

            let mut domain_buf = vec![0u8; domain_len];
            stream.read_exact(&mut domain_buf).await?;
            let domain = match String::from_utf8(domain_buf) {
                Ok(domain) => domain,
                Err(e) => bail!(Socks5Error::InvalidDomain(
                    String::from_utf8_lossy(e.as_bytes()).into_owned()
                )),
            };

            let port = read_port(stream).await?;

            Ok(TargetAddr::domain(domain, port))
        }

        SOCKS5_ADDR_TYPE_IPV6 => {
            let mut addr = [0u8; 16];
            stream.read_exact(&mut addr).await?;
            let port = read_port(stream).await?;

            Ok(TargetAddr::ipv6(Ipv6Addr::from(addr), port))
        }

        _ => bail!(Socks5Error::AddressTypeNotSupported(addr_type)),
    }
}

async fn read_port<S: AsyncRead + Unpin>(stream: &mut S) -> Result<u16> {
    let mut port_buf = [0u8; 2];
    stream.read_exact(&mut port_buf).await?;
    Ok(u16::from_be_bytes(port_buf))
}

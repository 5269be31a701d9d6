//! Main SOCKS5 handler
//!
//! Drives one classified connection through negotiation, authentication,
//! request parsing, the destination filter, the target dial and the relay.

use crate::context::ProxyContext;
use crate::error::{Socks5Error, Socks5ReplyCode};
use crate::relay::relay_tcp;
use crate::request::ProxyRequest;
use crate::socks::auth::authenticate;
use crate::socks::command::{build_reply, parse_command, send_command_not_supported, send_success};
use crate::socks::types::SocksCommand;
use crate::transport::TcpTransport;
use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

/// Handle SOCKS5 protocol on a stream
///
/// # Protocol Flow
///
/// 1. Method negotiation
/// 2. Username/password authentication (if credentials are configured)
/// 3. Command parsing
/// 4. Destination filter
/// 5. Target dial, reply and relay (CONNECT only)
///
/// Failures that the protocol has a reply for are answered before the
/// connection is closed; malformed input closes it without a reply.
pub async fn handle_socks5_on_stream<S>(mut stream: S, ctx: &ProxyContext) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let auth_method = authenticate(&mut stream, ctx.policy.credentials())
        .await
        .with_context(|| "Authentication negotiation failed")?;

    debug!("Authentication completed with method: {:?}", auth_method);

    let (command, target_addr) = match parse_command(&mut stream).await {
        Ok(parsed) => parsed,
        Err(e) => match e.downcast_ref::<Socks5Error>() {
            // The whole request was read, so this is answered like BIND
            Some(Socks5Error::CommandNotSupported(code)) => {
                warn!("SOCKS5 command {:#04x} not supported", code);
                send_command_not_supported(&mut stream).await?;
                return Ok(());
            }
            Some(Socks5Error::AddressTypeNotSupported(_)) => {
                build_reply(&mut stream, Socks5ReplyCode::AddressTypeNotSupported, None).await?;
                return Err(e.context("Failed to parse SOCKS5 command"));
            }
            _ => return Err(e.context("Failed to parse SOCKS5 command")),
        },
    };

    if command != SocksCommand::Connect {
        warn!("SOCKS5 {} to {} not supported", command, target_addr);
        send_command_not_supported(&mut stream).await?;
        return Ok(());
    }

    let request = target_addr.into_request()?;
    info!("SOCKS5 {} request to {}", command, request);

    if !ctx.policy.permits(&request) {
        warn!("SOCKS5 destination {} not allowed", request);
        build_reply(&mut stream, Socks5ReplyCode::ConnectionNotAllowed, None).await?;
        return Ok(());
    }

    handle_tcp_connect(stream, &request, &ctx.transport).await
}

/// Dial the target, report the outcome and relay until both sides close
async fn handle_tcp_connect<S>(
    mut client_stream: S,
    request: &ProxyRequest,
    transport: &TcpTransport,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    debug!("Connecting to target: {}", request);

    let target_stream = match transport.connect(request.host(), request.port()).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!("Failed to connect to {}: {}", request, e);
            build_reply(&mut client_stream, Socks5ReplyCode::from(&e), None).await?;
            return Err(anyhow::Error::new(e).context(format!("Failed to connect to {}", request)));
        }
    };

    let local_addr = target_stream.local_addr().ok();
    send_success(&mut client_stream, local_addr).await?;

    info!("SOCKS5 tunnel established to {}", request);

    match relay_tcp(client_stream, target_stream).await {
        Ok(stats) => debug!("SOCKS5 tunnel to {} closed: {:?}", request, stats),
        Err(e) => debug!("SOCKS5 tunnel to {} ended: {}", request, e),
    }

    Ok(())
}

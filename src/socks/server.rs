//! SOCKS5 endpoint server

use super::handler::handle_socks5_on_stream;
use crate::context::ProxyContext;
use crate::mux::MuxListener;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

/// Serves SOCKS5 on connections routed by the multiplexer
#[derive(Debug, Clone)]
pub struct Socks5Server {
    ctx: Arc<ProxyContext>,
}

impl Socks5Server {
    /// Create a server sharing the given context
    pub fn new(ctx: Arc<ProxyContext>) -> Self {
        Self { ctx }
    }

    /// Accept connections until the endpoint closes, one task per connection
    pub async fn serve<S>(self, mut listener: MuxListener<S>)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    info!("SOCKS5 server stopped: {}", e);
                    break;
                }
            };

            debug!("SOCKS5 connection from {}", peer);
            let ctx = self.ctx.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_socks5_on_stream(stream, &ctx).await {
                    debug!("SOCKS5 connection from {} ended: {:#}", peer, e);
                }
            });
        }
    }
}

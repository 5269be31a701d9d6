//! HTTP endpoint server

use super::handler::handle_request;
use crate::context::ProxyContext;
use crate::mux::MuxListener;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

/// Serves HTTP proxy requests on connections routed by the multiplexer
#[derive(Debug, Clone)]
pub struct HttpProxyServer {
    ctx: Arc<ProxyContext>,
}

impl HttpProxyServer {
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
                    info!("HTTP server stopped: {}", e);
                    break;
                }
            };

            debug!("HTTP connection from {}", peer);
            let ctx = self.ctx.clone();
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |req| handle_request(req, ctx.clone()));

                if let Err(err) = http1::Builder::new()
                    .preserve_header_case(true)
                    .title_case_headers(true)
                    .serve_connection(io, service)
                    .with_upgrades()
                    .await
                {
                    debug!("HTTP connection from {} ended: {:?}", peer, err);
                }
            });
        }
    }
}

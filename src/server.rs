//! Host process wiring
//!
//! Binds the configured port, splits it with the multiplexer and runs both
//! protocol engines until shutdown.

use crate::config::Config;
use crate::context::ProxyContext;
use crate::error::ProxyError;
use crate::http::HttpProxyServer;
use crate::mux::{Accept, Multiplexer};
use crate::socks::Socks5Server;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::info;

/// Bind the configured address and serve until shutdown
pub async fn run_server(config: Config, shutdown_rx: broadcast::Receiver<bool>) -> Result<()> {
    let addr = config.server.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| ProxyError::Bind {
            addr: addr.clone(),
            source,
        })?;

    info!("listening on port {} (SOCKS5 and HTTP)", config.server.port);

    serve_listener(listener, &config, shutdown_rx).await
}

/// Serve SOCKS5 and HTTP on an already-bound listener.
///
/// Returns once the accept loop has stopped and both engines have drained
/// their endpoints. Connections already handed to an engine keep running in
/// their own tasks.
pub async fn serve_listener<L: Accept>(
    listener: L,
    config: &Config,
    shutdown_rx: broadcast::Receiver<bool>,
) -> Result<()> {
    let ctx = Arc::new(ProxyContext::from_config(config));

    if ctx.policy.auth_required() {
        info!("Authentication enabled for SOCKS5 and HTTP");
    }
    if ctx.policy.filter().is_enabled() {
        info!(
            "Destination filter enabled: {}",
            config.filter.allowed_dest_fqdn.as_deref().unwrap_or_default()
        );
    }

    let mux = Multiplexer::new(
        listener,
        Duration::from_secs(config.server.classify_timeout),
    );
    let (socks, http, accept_task) = mux.split(shutdown_rx);

    let socks_task = tokio::spawn(Socks5Server::new(ctx.clone()).serve(socks));
    let http_task = tokio::spawn(HttpProxyServer::new(ctx).serve(http));

    let (accept_result, socks_result, http_result) =
        tokio::join!(accept_task, socks_task, http_task);
    accept_result?;
    socks_result?;
    http_result?;

    info!("Server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    #[tokio::test]
    async fn test_run_server_bind_failure() {
        let occupied = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = occupied.local_addr().unwrap().port();

        let config = parse_config(&format!(
            "[server]\nlisten_addr = \"127.0.0.1\"\nport = {}\n",
            port
        ))
        .unwrap();
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let err = run_server(config, shutdown_rx).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProxyError>(),
            Some(ProxyError::Bind { .. })
        ));
    }

    #[tokio::test]
    async fn test_serve_listener_stops_on_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let config = Config::default();

        let handle =
            tokio::spawn(async move { serve_listener(listener, &config, shutdown_rx).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(true).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}

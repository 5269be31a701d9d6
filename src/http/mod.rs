//! HTTP proxy engine
//!
//! Handles `CONNECT` tunnels and absolute-URI forwarding on connections
//! handed over by the multiplexer, with `Proxy-Authorization: Basic`
//! authentication and the shared destination filter.

mod auth;
mod handler;
mod server;

pub use auth::check_proxy_auth;
pub use handler::{connect_target, forward_target, handle_request, ProxyBody};
pub use server::HttpProxyServer;

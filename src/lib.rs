//! # Mixproxy - SOCKS5 and HTTP proxy on one port
//!
//! Mixproxy is a forward proxy that serves SOCKS5 and HTTP(S) clients on a
//! single TCP port. Each accepted connection is classified by its first byte
//! and handed to exactly one protocol engine.
//!
//! ## Features
//!
//! - **Single port**: SOCKS5 (`0x05`) and HTTP (ASCII method) share a listener
//! - **SOCKS5 CONNECT**: RFC 1928 with RFC 1929 username/password auth
//! - **HTTP proxying**: `CONNECT` tunnels and absolute-URI forwarding
//! - **Shared policy**: one credential pair and one glob allow pattern apply
//!   to both protocols
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mixproxy::config::load_config;
//! use mixproxy::server::run_server;
//! use tokio::sync::broadcast;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config("config.toml")?;
//!     let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
//!
//!     run_server(config, shutdown_rx).await
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Client -> Multiplexer -> {SOCKS5 | HTTP} engine -> Policy -> Target
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod context;
pub mod error;
pub mod http;
pub mod mux;
pub mod policy;
pub mod relay;
pub mod request;
pub mod server;
pub mod socks;
pub mod transport;

// Re-export commonly used items
pub use config::{load_config, Config};
pub use context::ProxyContext;
pub use error::{ProxyError, Socks5Error};
pub use server::{run_server, serve_listener};

/// Version of the Mixproxy library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");

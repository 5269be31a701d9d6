//! SOCKS5 engine
//!
//! Implements RFC 1928 CONNECT with RFC 1929 username/password
//! authentication on connections handed over by the multiplexer. BIND and
//! UDP ASSOCIATE are answered with "command not supported".

mod auth;
mod command;
mod consts;
mod handler;
mod server;
mod types;

pub use auth::{authenticate, AuthMethod};
pub use command::{build_reply, parse_command};
pub use consts::*;
pub use handler::handle_socks5_on_stream;
pub use server::Socks5Server;
pub use types::{SocksCommand, TargetAddr};

//! Single-port protocol multiplexer
//!
//! Every accepted connection is classified by its first byte and handed, with
//! that byte still readable, to exactly one protocol engine:
//!
//! ```text
//! 0x05            -> SOCKS5 endpoint
//! ASCII letter    -> HTTP endpoint
//! anything else   -> closed
//! silence         -> closed after the classification timeout
//! ```

mod listener;
mod stream;

pub use listener::{Accept, Multiplexer, MuxListener};
pub use stream::PeekedStream;

use std::fmt;

/// SOCKS protocol version byte opening every SOCKS5 greeting
pub const SOCKS5_FIRST_BYTE: u8 = 0x05;

/// Protocol chosen for a connection at classification time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// SOCKS5 (RFC 1928)
    Socks5,
    /// HTTP/1.x proxy request
    Http,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Socks5 => write!(f, "SOCKS5"),
            Protocol::Http => write!(f, "HTTP"),
        }
    }
}

/// Classify a connection from its first byte.
///
/// HTTP request lines start with a method token, so any ASCII letter routes
/// to the HTTP engine. Returns `None` for bytes neither protocol can start with.
pub fn classify(first: u8) -> Option<Protocol> {
    if first == SOCKS5_FIRST_BYTE {
        Some(Protocol::Socks5)
    } else if first.is_ascii_alphabetic() {
        Some(Protocol::Http)
    } else {
        None
    }
}

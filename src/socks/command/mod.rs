//! SOCKS5 command handling module

mod parser;
mod reply;

pub use parser::parse_command;
pub use reply::{build_reply, send_command_not_supported, send_success};

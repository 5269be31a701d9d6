//! Access policy shared by the SOCKS5 and HTTP engines
//!
//! Both engines consult the same [`Policy`] instance, so a destination or a
//! credential pair is judged identically whichever protocol carried it.

mod credentials;
mod filter;

pub use credentials::Credentials;
pub use filter::DestinationFilter;

use crate::request::ProxyRequest;

/// Credentials and destination filter, fixed before serving starts.
#[derive(Debug, Clone, Default)]
pub struct Policy {
    credentials: Credentials,
    filter: DestinationFilter,
}

impl Policy {
    /// Create a policy from its two parts
    pub fn new(credentials: Credentials, filter: DestinationFilter) -> Self {
        Self {
            credentials,
            filter,
        }
    }

    /// The configured credentials
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// The configured destination filter
    pub fn filter(&self) -> &DestinationFilter {
        &self.filter
    }

    /// Whether clients must authenticate
    pub fn auth_required(&self) -> bool {
        self.credentials.is_enabled()
    }

    /// Check a presented username/password pair
    pub fn authenticate(&self, username: &str, password: &str) -> bool {
        self.credentials.authenticate(username, password)
    }

    /// Check whether the request's destination may be reached
    pub fn permits(&self, request: &ProxyRequest) -> bool {
        self.filter.allowed(request.host())
    }
}

//! Credential validator
//!
//! Holds at most one username/password pair. When none is configured,
//! authentication is disabled and every presented pair is accepted.

use std::fmt;

/// Optional single username/password pair
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pair: Option<(String, String)>,
}

impl Credentials {
    /// Credentials requiring this exact username and password.
    ///
    /// A pair where both fields are empty disables authentication, matching
    /// how the environment-driven configuration treats unset values.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        let username = username.into();
        let password = password.into();

        if username.is_empty() && password.is_empty() {
            return Self::disabled();
        }

        Self {
            pair: Some((username, password)),
        }
    }

    /// Build from optional configuration values.
    ///
    /// A missing field is treated as empty; authentication is enabled as soon
    /// as either field is non-empty.
    pub fn from_options(username: Option<&str>, password: Option<&str>) -> Self {
        Self::new(username.unwrap_or_default(), password.unwrap_or_default())
    }

    /// No credentials: every request passes
    pub fn disabled() -> Self {
        Self { pair: None }
    }

    /// Whether a username/password pair is configured
    pub fn is_enabled(&self) -> bool {
        self.pair.is_some()
    }

    /// Returns true if authentication is disabled or both fields match exactly.
    pub fn authenticate(&self, username: &str, password: &str) -> bool {
        match &self.pair {
            None => true,
            Some((expected_user, expected_pass)) => {
                expected_user == username && expected_pass == password
            }
        }
    }
}

// Keep the password out of logs
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.pair {
            None => f.write_str("Credentials(disabled)"),
            Some((user, _)) => f
                .debug_struct("Credentials")
                .field("username", user)
                .field("password", &"***")
                .finish(),
        }
    }
}

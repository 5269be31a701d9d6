//! `Proxy-Authorization: Basic` handling

use crate::error::ProxyError;
use crate::policy::Policy;
use base64::{engine::general_purpose, Engine as _};
use http::header::PROXY_AUTHORIZATION;
use http::HeaderMap;

/// Check the request's proxy credentials against the policy.
///
/// Passes unconditionally when no credentials are configured.
pub fn check_proxy_auth(headers: &HeaderMap, policy: &Policy) -> Result<(), ProxyError> {
    if !policy.auth_required() {
        return Ok(());
    }

    let header = headers
        .get(PROXY_AUTHORIZATION)
        .ok_or_else(|| ProxyError::Auth("Missing Proxy-Authorization header".to_string()))?;

    let value = header
        .to_str()
        .map_err(|_| ProxyError::Auth("Invalid Proxy-Authorization header".to_string()))?;

    let (username, password) = parse_basic(value)?;

    if policy.authenticate(&username, &password) {
        Ok(())
    } else {
        Err(ProxyError::Auth(format!(
            "Invalid username or password for user: {}",
            username
        )))
    }
}

/// Decode a `Basic <base64(user:pass)>` credential; the scheme is case-insensitive
fn parse_basic(value: &str) -> Result<(String, String), ProxyError> {
    let (scheme, encoded) = value
        .trim()
        .split_once(' ')
        .ok_or_else(|| ProxyError::Auth("Malformed Proxy-Authorization header".to_string()))?;

    if !scheme.eq_ignore_ascii_case("basic") {
        return Err(ProxyError::Auth(format!(
            "Unsupported authentication scheme: {}",
            scheme
        )));
    }

    let decoded = general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|_| ProxyError::Auth("Invalid base64 encoding".to_string()))?;
    let credentials = String::from_utf8(decoded)
        .map_err(|_| ProxyError::Auth("Invalid UTF-8 in credentials".to_string()))?;

    let (username, password) = credentials
        .split_once(':')
        .ok_or_else(|| ProxyError::Auth("Invalid credentials format".to_string()))?;

    Ok((username.to_string(), password.to_string()))
}

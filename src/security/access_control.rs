//! Local access key enforcement.
//!
//! A pure predicate over the inbound path and headers. The HTTP middleware
//! that acts on it lives in `http::middleware::access_control`.

use std::fmt;

use axum::http::{header, HeaderMap, HeaderName};

use crate::config::AuthConfig;

/// Why a request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnauthorizedReason {
    /// No bearer token and no alternate key header.
    MissingKey,
    /// A key was presented but does not match.
    InvalidKey,
}

impl UnauthorizedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnauthorizedReason::MissingKey => "missing_key",
            UnauthorizedReason::InvalidKey => "invalid_key",
        }
    }
}

impl fmt::Display for UnauthorizedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnauthorizedReason::MissingKey => f.write_str("missing access key"),
            UnauthorizedReason::InvalidKey => f.write_str("invalid access key"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthDecision {
    Authorized,
    Unauthorized(UnauthorizedReason),
}

/// Validates the local access key.
#[derive(Debug, Clone)]
pub struct AuthGate {
    enabled: bool,
    expected: String,
    alt_header: HeaderName,
    public_paths: Vec<String>,
}

impl AuthGate {
    pub fn new(config: &AuthConfig) -> Self {
        let alt_header = HeaderName::from_bytes(config.alt_header.as_bytes())
            .unwrap_or_else(|_| HeaderName::from_static("x-api-key"));
        Self {
            enabled: config.enabled,
            expected: config.access_key.clone(),
            alt_header,
            public_paths: config.public_paths.clone(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_public(&self, path: &str) -> bool {
        self.public_paths.iter().any(|p| p == path)
    }

    pub fn check(&self, path: &str, headers: &HeaderMap) -> AuthDecision {
        if !self.enabled || self.is_public(path) {
            return AuthDecision::Authorized;
        }

        let bearer = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(bearer_token);
        let alternate = headers
            .get(&self.alt_header)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        let presented: Vec<&str> = bearer.into_iter().chain(alternate).collect();
        if presented.is_empty() {
            return AuthDecision::Unauthorized(UnauthorizedReason::MissingKey);
        }
        if presented.iter().any(|key| keys_match(key, &self.expected)) {
            AuthDecision::Authorized
        } else {
            AuthDecision::Unauthorized(UnauthorizedReason::InvalidKey)
        }
    }
}

fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Compare without short-circuiting on the first differing byte.
fn keys_match(presented: &str, expected: &str) -> bool {
    let (a, b) = (presented.as_bytes(), expected.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

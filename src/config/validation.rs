//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Check that credentials fit in an HTTP header
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RelayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use axum::http::HeaderValue;
use thiserror::Error;
use url::Url;

use crate::config::schema::RelayConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("upstream.origin: {0}")]
    InvalidOrigin(String),

    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("{0} is not a valid header value")]
    InvalidHeaderValue(&'static str),

    #[error("auth.public_paths: {0:?} must start with '/'")]
    RelativePublicPath(String),
}

/// Check a parsed configuration for semantic errors.
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }
    if config.listener.max_body_bytes == 0 {
        errors.push(ValidationError::Zero("listener.max_body_bytes"));
    }

    let upstream = &config.upstream;
    match Url::parse(&upstream.origin) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {
            if url.query().is_some() || url.fragment().is_some() {
                errors.push(ValidationError::InvalidOrigin(
                    "must not carry a query or fragment".to_string(),
                ));
            }
        }
        Ok(url) => errors.push(ValidationError::InvalidOrigin(format!(
            "unsupported scheme {:?}",
            url.scheme()
        ))),
        Err(e) => errors.push(ValidationError::InvalidOrigin(e.to_string())),
    }

    if upstream.api_key.trim().is_empty() {
        errors.push(ValidationError::Empty("upstream.api_key"));
    } else if HeaderValue::from_str(&format!("Bearer {}", upstream.api_key)).is_err() {
        errors.push(ValidationError::InvalidHeaderValue("upstream.api_key"));
    }
    if let Some(org) = &upstream.organization {
        if HeaderValue::from_str(org).is_err() {
            errors.push(ValidationError::InvalidHeaderValue("upstream.organization"));
        }
    }
    if let Some(beta) = &upstream.beta_override {
        if HeaderValue::from_str(beta).is_err() {
            errors.push(ValidationError::InvalidHeaderValue("upstream.beta_override"));
        }
    }
    if upstream.timeout_secs == 0 {
        errors.push(ValidationError::Zero("upstream.timeout_secs"));
    }
    if upstream.connect_timeout_secs == 0 {
        errors.push(ValidationError::Zero("upstream.connect_timeout_secs"));
    }

    let auth = &config.auth;
    if auth.enabled && auth.access_key.is_empty() {
        errors.push(ValidationError::Empty("auth.access_key"));
    }
    if axum::http::HeaderName::from_bytes(auth.alt_header.as_bytes()).is_err() {
        errors.push(ValidationError::InvalidHeaderValue("auth.alt_header"));
    }
    for path in &auth.public_paths {
        if !path.starts_with('/') {
            errors.push(ValidationError::RelativePublicPath(path.clone()));
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

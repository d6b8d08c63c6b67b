//! Error mapping for relayed calls.
//!
//! Every failure a caller can observe (local validation, transport, access
//! control) is a [`RelayError`]. Each one maps to a stable kind, an HTTP
//! status and the envelope
//!
//! ```text
//! {"error": {"type": "...", "message": "...", "code": "...", "param": "..."}}
//! ```
//!
//! Upstream 4xx/5xx responses are not errors here: they are relayed as-is.
//! This module never logs; callers decide what to record.

use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::time::Duration;

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::security::access_control::UnauthorizedReason;

/// Stable error categories exposed in the envelope's `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UpstreamTimeout,
    UpstreamUnreachable,
    InvalidRequest,
    Unauthorized,
    NotFound,
    ProxyError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UpstreamTimeout => "upstream_timeout",
            ErrorKind::UpstreamUnreachable => "upstream_unreachable",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::NotFound => "not_found",
            ErrorKind::ProxyError => "proxy_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed relay call.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The end-to-end deadline elapsed before upstream answered.
    #[error("upstream did not respond within {}s", .0.as_secs_f64())]
    Timeout(Duration),

    /// Connection could not be established (refused, DNS, TLS handshake).
    #[error("upstream unreachable: {0}")]
    Unreachable(String),

    /// Connected, but the exchange failed before a response arrived.
    #[error("upstream connection failed: {0}")]
    Transport(String),

    #[error("{message}")]
    InvalidRequest {
        message: String,
        param: Option<String>,
    },

    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("{0}")]
    Unauthorized(UnauthorizedReason),

    #[error("no upstream route for {0}")]
    UnknownRoute(String),

    /// Reading an upstream body broke off mid-way.
    #[error("upstream body read failed: {0}")]
    Body(String),

    #[error("relay error: {0}")]
    Internal(String),
}

impl RelayError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        RelayError::InvalidRequest {
            message: message.into(),
            param: None,
        }
    }

    /// Classify an outbound transport failure.
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            // reqwest does not expose its configured duration
            RelayError::Timeout(Duration::ZERO)
        } else if err.is_connect() {
            RelayError::Unreachable(error_chain(&err))
        } else if err.is_body() || err.is_decode() {
            RelayError::Body(error_chain(&err))
        } else if err.is_builder() {
            RelayError::Internal(error_chain(&err))
        } else {
            RelayError::Transport(error_chain(&err))
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RelayError::Timeout(_) => ErrorKind::UpstreamTimeout,
            RelayError::Unreachable(_) | RelayError::Transport(_) => {
                ErrorKind::UpstreamUnreachable
            }
            RelayError::InvalidRequest { .. } | RelayError::PayloadTooLarge { .. } => {
                ErrorKind::InvalidRequest
            }
            RelayError::Unauthorized(_) => ErrorKind::Unauthorized,
            RelayError::UnknownRoute(_) => ErrorKind::NotFound,
            RelayError::Body(_) | RelayError::Internal(_) => ErrorKind::ProxyError,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            RelayError::Unreachable(_) => StatusCode::SERVICE_UNAVAILABLE,
            RelayError::Transport(_) | RelayError::Body(_) | RelayError::Internal(_) => {
                StatusCode::BAD_GATEWAY
            }
            RelayError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            RelayError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            RelayError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            RelayError::UnknownRoute(_) => StatusCode::NOT_FOUND,
        }
    }

    fn code(&self) -> Option<&'static str> {
        match self {
            RelayError::Unauthorized(reason) => Some(reason.as_str()),
            RelayError::UnknownRoute(_) => Some("unknown_route"),
            RelayError::PayloadTooLarge { .. } => Some("payload_too_large"),
            _ => None,
        }
    }

    /// Build the uniform error envelope for this failure.
    pub fn envelope(&self) -> ErrorEnvelope {
        let param = match self {
            RelayError::InvalidRequest { param, .. } => param.clone(),
            _ => None,
        };
        ErrorEnvelope {
            error: ErrorBody {
                kind: self.kind().as_str().to_string(),
                message: self.to_string(),
                code: self.code().map(str::to_string),
                param,
            },
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let unauthorized = matches!(self, RelayError::Unauthorized(_));
        let mut response = (status, Json(self.envelope())).into_response();
        if unauthorized {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

/// `{"error": {...}}`
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorBody {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
}

/// True when a body read failure only means the peer already hung up.
pub fn is_benign_close(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            if matches!(
                io_err.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
            ) {
                return true;
            }
            if let Some(inner) = io_err.get_ref() {
                if is_benign_close(inner) {
                    return true;
                }
            }
        }
        // hyper reports a peer close mid-body without an io source
        if e.to_string().contains("connection closed before message completed") {
            return true;
        }
        current = e.source();
    }
    false
}

fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(e) = source {
        let part = e.to_string();
        if !message.contains(&part) {
            message.push_str(": ");
            message.push_str(&part);
        }
        source = e.source();
    }
    message
}

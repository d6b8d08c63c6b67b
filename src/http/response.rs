//! Response conversion.
//!
//! # Responsibilities
//! - Turn a [`RelayResult`] into the client response
//! - Stream chunks as they arrive, without buffering
//! - Ask reverse proxies in front of us not to buffer streams
//!
//! # Design Decisions
//! - Upstream status and headers are relayed as-is (hop-by-hop already stripped)
//! - A mid-stream failure aborts the client connection; it is logged, not enveloped

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue},
    response::{IntoResponse, Response},
};
use futures_util::TryStreamExt;

use crate::relay::RelayResult;

pub const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

impl IntoResponse for RelayResult {
    fn into_response(self) -> Response {
        match self {
            RelayResult::Buffered {
                status,
                headers,
                body,
            } => {
                let mut response = Response::new(Body::from(body));
                *response.status_mut() = status;
                *response.headers_mut() = headers;
                response
            }
            RelayResult::Streamed {
                status,
                mut headers,
                chunks,
            } => {
                headers
                    .entry(X_ACCEL_BUFFERING)
                    .or_insert(HeaderValue::from_static("no"));
                let chunks = chunks.inspect_err(|e| {
                    tracing::warn!(kind = %e.kind(), error = %e, "Upstream stream broke off");
                });
                let mut response = Response::new(Body::from_stream(chunks));
                *response.status_mut() = status;
                *response.headers_mut() = headers;
                response
            }
        }
    }
}

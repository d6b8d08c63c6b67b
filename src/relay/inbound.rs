//! Captured inbound requests and per-call forwarding instructions.

use axum::http::{header, request::Parts, HeaderMap, Method};
use bytes::Bytes;
use serde_json::Value;

use crate::relay::error::RelayError;

/// An inbound request, captured once and never mutated.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    method: Method,
    path: String,
    raw_query: Option<String>,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
    content_type: Option<String>,
}

impl InboundRequest {
    pub fn new(method: Method, path_and_query: &str, headers: HeaderMap, body: Bytes) -> Self {
        let (path, raw_query) = match path_and_query.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (path_and_query, None),
        };
        let raw_query = raw_query.filter(|q| !q.is_empty()).map(str::to_string);
        let query = raw_query
            .as_deref()
            .map(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .into_owned()
                    .collect()
            })
            .unwrap_or_default();
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Self {
            method,
            path: path.to_string(),
            raw_query,
            query,
            headers,
            body,
            content_type,
        }
    }

    /// Capture from the parts of an axum request and its fully read body.
    pub fn from_parts(parts: &Parts, body: Bytes) -> Self {
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or_else(|| parts.uri.path());
        Self::new(parts.method.clone(), path_and_query, parts.headers.clone(), body)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Query string exactly as received, without the leading `?`.
    pub fn raw_query(&self) -> Option<&str> {
        self.raw_query.as_deref()
    }

    /// Decoded query pairs in arrival order, duplicates preserved.
    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    /// First value of a query parameter.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Whether the declared content type is JSON, or absent.
    pub fn has_json_body(&self) -> bool {
        match self.content_type() {
            None => true,
            Some(ct) => {
                let essence = ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
                essence == "application/json" || essence.ends_with("+json")
            }
        }
    }

    /// Parse the raw body as a JSON value.
    pub fn json_body(&self) -> Result<Value, RelayError> {
        serde_json::from_slice(&self.body).map_err(|e| RelayError::InvalidRequest {
            message: format!("request body is not valid JSON: {e}"),
            param: None,
        })
    }
}

/// How a route wants one inbound request relayed.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardSpec {
    pub upstream_path: String,
    pub body_override: Option<Value>,
    pub stream_hint: Option<bool>,
}

impl ForwardSpec {
    pub fn to(upstream_path: impl Into<String>) -> Self {
        Self {
            upstream_path: upstream_path.into(),
            body_override: None,
            stream_hint: None,
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body_override = Some(body);
        self
    }

    pub fn with_stream_hint(mut self, streaming: bool) -> Self {
        self.stream_hint = Some(streaming);
        self
    }
}

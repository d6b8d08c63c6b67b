//! Streaming classification.
//!
//! Decides once, before the outbound call, whether the response is relayed
//! as a chunk stream or read into memory. First match wins:
//!
//! 1. body declares `"stream": true`
//! 2. explicit hint on the [`ForwardSpec`](crate::relay::ForwardSpec)
//! 3. `Accept` asks for SSE / octet-stream / NDJSON, or query `stream=true`
//! 4. buffered
//!
//! The only later revision is [`StreamDecision::downgrade`], taken when
//! upstream answers an error without an event stream.

use std::fmt;

use axum::http::{header, HeaderMap};
use serde_json::Value;

/// What triggered a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamTrigger {
    RouteHint,
    BodyFlag,
    AcceptHeader,
    QueryFlag,
    Default,
    UpstreamError,
}

impl fmt::Display for StreamTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StreamTrigger::RouteHint => "route_hint",
            StreamTrigger::BodyFlag => "body_flag",
            StreamTrigger::AcceptHeader => "accept_header",
            StreamTrigger::QueryFlag => "query_flag",
            StreamTrigger::Default => "default",
            StreamTrigger::UpstreamError => "upstream_error",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamDecision {
    pub is_streaming: bool,
    pub trigger: StreamTrigger,
}

impl StreamDecision {
    fn streaming(trigger: StreamTrigger) -> Self {
        Self {
            is_streaming: true,
            trigger,
        }
    }

    fn buffered(trigger: StreamTrigger) -> Self {
        Self {
            is_streaming: false,
            trigger,
        }
    }

    /// Fall back to buffered after upstream signalled an error up front.
    pub fn downgrade(self) -> Self {
        Self::buffered(StreamTrigger::UpstreamError)
    }
}

/// Inputs to [`decide`], borrowed from the call.
#[derive(Debug, Clone, Copy)]
pub struct StreamInputs<'a> {
    pub hint: Option<bool>,
    pub body: Option<&'a Value>,
    pub headers: &'a HeaderMap,
    pub stream_query: Option<&'a str>,
}

const STREAMING_ACCEPT_EXACT: &[&str] = &[
    "application/octet-stream",
    "application/x-ndjson",
    "application/ndjson",
];

pub fn decide(inputs: StreamInputs<'_>) -> StreamDecision {
    // `stream: true` in the body always streams; a route hint cannot veto it.
    if body_requests_stream(inputs.body) {
        return StreamDecision::streaming(StreamTrigger::BodyFlag);
    }

    if let Some(hint) = inputs.hint {
        return if hint {
            StreamDecision::streaming(StreamTrigger::RouteHint)
        } else {
            StreamDecision::buffered(StreamTrigger::RouteHint)
        };
    }

    if accept_requests_stream(inputs.headers) {
        return StreamDecision::streaming(StreamTrigger::AcceptHeader);
    }

    if inputs.stream_query == Some("true") {
        return StreamDecision::streaming(StreamTrigger::QueryFlag);
    }

    StreamDecision::buffered(StreamTrigger::Default)
}

fn body_requests_stream(body: Option<&Value>) -> bool {
    body.and_then(|b| b.get("stream"))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

fn accept_requests_stream(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|accept| {
            let lower = accept.to_ascii_lowercase();
            if lower.contains("text/event-stream") {
                return true;
            }
            let essence = lower.split(';').next().unwrap_or("").trim();
            STREAMING_ACCEPT_EXACT.contains(&essence)
        })
}

/// Whether an upstream content type is itself an event stream.
pub fn is_event_stream(content_type: Option<&str>) -> bool {
    content_type
        .map(|ct| ct.to_ascii_lowercase().starts_with("text/event-stream"))
        .unwrap_or(false)
}

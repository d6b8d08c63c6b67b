//! Route family lookup.
//!
//! # Responsibilities
//! - Hold the static table of upstream resource families
//! - Map a local `/v1/...` path to its family and upstream path
//! - Return an explicit no-match for anything outside the table
//!
//! # Design Decisions
//! - Immutable `const` table, no registration at runtime
//! - O(n) prefix scan (the table is small)
//! - First match wins

use serde::Serialize;

use crate::routing::matcher::{has_dot_segment, strip_version, PathMatch};

/// How the relay treats a family's request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyMode {
    /// Parsed locally; malformed bodies are rejected before forwarding.
    Json,
    /// Forwarded byte-for-byte (multipart uploads, binary audio).
    Passthrough,
}

/// One upstream resource family.
#[derive(Debug, Clone, Copy)]
pub struct RouteFamily {
    pub name: &'static str,
    pub matcher: PathMatch,
    pub body: BodyMode,
}

impl RouteFamily {
    const fn json(name: &'static str, prefix: &'static str) -> Self {
        Self { name, matcher: PathMatch::Prefix(prefix), body: BodyMode::Json }
    }

    const fn passthrough(name: &'static str, prefix: &'static str) -> Self {
        Self { name, matcher: PathMatch::Prefix(prefix), body: BodyMode::Passthrough }
    }

    /// The path prefix this family owns, for discovery documents.
    pub fn prefix(&self) -> &'static str {
        match self.matcher {
            PathMatch::Prefix(p) | PathMatch::Contains(p) => p,
        }
    }
}

pub const ROUTE_FAMILIES: &[RouteFamily] = &[
    RouteFamily::json("chat", "/chat"),
    RouteFamily::json("completions", "/completions"),
    RouteFamily::json("embeddings", "/embeddings"),
    RouteFamily::json("moderations", "/moderations"),
    RouteFamily::json("responses", "/responses"),
    RouteFamily::json("assistants", "/assistants"),
    RouteFamily::json("threads", "/threads"),
    RouteFamily::json("vector_stores", "/vector_stores"),
    RouteFamily::json("vector-stores", "/vector-stores"),
    RouteFamily::json("tools", "/tools"),
    RouteFamily::json("batches", "/batches"),
    RouteFamily::json("fine_tuning", "/fine_tuning"),
    RouteFamily::json("realtime", "/realtime"),
    RouteFamily::passthrough("files", "/files"),
    RouteFamily::passthrough("uploads", "/uploads"),
    RouteFamily::passthrough("audio", "/audio"),
    RouteFamily::passthrough("audio-pro", "/audio-pro"),
    RouteFamily::passthrough("images", "/images"),
    RouteFamily::passthrough("models", "/models"),
    RouteFamily::passthrough("videos", "/videos"),
];

/// A resolved route: the family and the path to request upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pub family: &'static str,
    pub body: BodyMode,
    pub upstream_path: String,
}

/// Resolve a local path against [`ROUTE_FAMILIES`].
pub fn resolve(path: &str) -> Option<RouteMatch> {
    if path != "/v1" && !path.starts_with("/v1/") {
        return None;
    }
    // a dot segment would be resolved away after the family check
    if has_dot_segment(path) {
        return None;
    }
    let upstream_path = strip_version(path);
    ROUTE_FAMILIES
        .iter()
        .find(|family| family.matcher.matches(upstream_path))
        .map(|family| RouteMatch {
            family: family.name,
            body: family.body,
            upstream_path: upstream_path.to_string(),
        })
}

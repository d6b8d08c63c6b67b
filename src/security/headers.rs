//! Outbound header derivation.
//!
//! # Responsibilities
//! - Build the upstream header set from scratch for every call
//! - Copy a short allow-list of inbound headers, drop everything else
//! - Substitute the server-held credential for the caller's
//! - Attach `OpenAI-Beta` tokens required by the target path
//!
//! # Design Decisions
//! - Allow-list, not deny-list: `Host`, `Content-Length`, `Transfer-Encoding`,
//!   `Connection` and the caller's `Authorization` can never leak through
//! - Header values derived from config are validated once at construction,
//!   so [`HeaderRewriter::rewrite`] is infallible and pure
//! - At most one `OpenAI-Beta` header; several tokens are comma-joined

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};

use crate::config::UpstreamConfig;
use crate::routing::matcher::{strip_version, PathMatch};

pub const OPENAI_BETA: HeaderName = HeaderName::from_static("openai-beta");
pub const OPENAI_ORGANIZATION: HeaderName = HeaderName::from_static("openai-organization");
pub const OPENAI_PROJECT: HeaderName = HeaderName::from_static("openai-project");
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");
pub const X_CLIENT_REQUEST_ID: HeaderName = HeaderName::from_static("x-client-request-id");

/// Inbound headers copied to upstream unchanged.
static PASSTHROUGH: [HeaderName; 4] = [
    header::ACCEPT,
    X_REQUEST_ID,
    X_CLIENT_REQUEST_ID,
    OPENAI_PROJECT,
];

/// Upstream response headers that describe the upstream hop, not the payload.
static HOP_BY_HOP: [HeaderName; 10] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    // the relay frames and encodes its own response
    header::CONTENT_LENGTH,
    header::CONTENT_ENCODING,
];

/// Copy upstream response headers, minus hop-by-hop, length and encoding.
///
/// Names listed in the upstream `Connection` header are dropped as well.
pub fn strip_hop_by_hop(upstream: &HeaderMap) -> HeaderMap {
    let connection_listed: Vec<HeaderName> = upstream
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    let mut out = HeaderMap::with_capacity(upstream.len());
    for (name, value) in upstream {
        if HOP_BY_HOP.contains(name) || connection_listed.contains(name) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

/// A path condition that opts a call into a beta surface.
#[derive(Debug, Clone, Copy)]
pub struct BetaRule {
    pub matcher: PathMatch,
    pub token: &'static str,
}

pub const BETA_RULES: &[BetaRule] = &[
    BetaRule { matcher: PathMatch::Prefix("/assistants"), token: "assistants=v2" },
    BetaRule { matcher: PathMatch::Prefix("/threads"), token: "assistants=v2" },
    BetaRule { matcher: PathMatch::Prefix("/vector_stores"), token: "assistants=v2" },
    BetaRule { matcher: PathMatch::Prefix("/vector-stores"), token: "assistants=v2" },
    BetaRule { matcher: PathMatch::Prefix("/tools"), token: "assistants=v2" },
    BetaRule { matcher: PathMatch::Contains("realtime"), token: "realtime=v1" },
    BetaRule { matcher: PathMatch::Contains("/videos"), token: "video=v1" },
    BetaRule { matcher: PathMatch::Contains("audio-pro"), token: "video=v1" },
];

/// Beta tokens required by an upstream path, de-duplicated in rule order.
pub fn beta_tokens(upstream_path: &str) -> Vec<&'static str> {
    let path = strip_version(upstream_path);
    let mut tokens: Vec<&'static str> = Vec::new();
    for rule in BETA_RULES {
        if rule.matcher.matches(path) && !tokens.contains(&rule.token) {
            tokens.push(rule.token);
        }
    }
    tokens
}

/// Derives outbound headers from the inbound set and static configuration.
#[derive(Debug, Clone)]
pub struct HeaderRewriter {
    authorization: HeaderValue,
    organization: Option<HeaderValue>,
    beta_override: Option<HeaderValue>,
}

/// A config value that cannot be sent as a header.
#[derive(Debug, thiserror::Error)]
#[error("{0} is not a valid header value")]
pub struct InvalidHeaderConfig(pub &'static str);

impl HeaderRewriter {
    pub fn new(config: &UpstreamConfig) -> Result<Self, InvalidHeaderConfig> {
        let mut authorization = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|_| InvalidHeaderConfig("upstream.api_key"))?;
        authorization.set_sensitive(true);

        let organization = config
            .organization
            .as_deref()
            .map(HeaderValue::from_str)
            .transpose()
            .map_err(|_| InvalidHeaderConfig("upstream.organization"))?;

        let beta_override = config
            .beta_override
            .as_deref()
            .map(HeaderValue::from_str)
            .transpose()
            .map_err(|_| InvalidHeaderConfig("upstream.beta_override"))?;

        Ok(Self {
            authorization,
            organization,
            beta_override,
        })
    }

    /// Build the outbound header set for one call.
    ///
    /// `inbound_content_type` is preserved unless a body override replaces
    /// the body, in which case the body is JSON.
    pub fn rewrite(
        &self,
        inbound: &HeaderMap,
        upstream_path: &str,
        has_body_override: bool,
    ) -> HeaderMap {
        let mut out = HeaderMap::new();

        for name in &PASSTHROUGH {
            for value in inbound.get_all(name) {
                out.append(name.clone(), value.clone());
            }
        }

        out.insert(header::AUTHORIZATION, self.authorization.clone());

        if let Some(org) = &self.organization {
            out.insert(OPENAI_ORGANIZATION, org.clone());
        }

        if let Some(beta) = self.beta_value(inbound, upstream_path) {
            out.insert(OPENAI_BETA, beta);
        }

        if has_body_override {
            out.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
        } else if let Some(ct) = inbound.get(header::CONTENT_TYPE) {
            out.insert(header::CONTENT_TYPE, ct.clone());
        }

        out
    }

    fn beta_value(&self, inbound: &HeaderMap, upstream_path: &str) -> Option<HeaderValue> {
        if let Some(forced) = &self.beta_override {
            return Some(forced.clone());
        }

        let tokens = beta_tokens(upstream_path);
        if !tokens.is_empty() {
            return HeaderValue::from_str(&tokens.join(",")).ok();
        }

        // No rule applies: keep the caller's own value, folded into one header.
        let declared: Vec<&str> = inbound
            .get_all(&OPENAI_BETA)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .collect();
        match declared.len() {
            0 => None,
            1 => inbound.get(&OPENAI_BETA).cloned(),
            _ => HeaderValue::from_str(&declared.join(",")).ok(),
        }
    }
}

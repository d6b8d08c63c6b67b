//! Outbound request assembly.

use axum::http::{HeaderMap, Method};
use bytes::Bytes;
use url::Url;

use crate::relay::error::RelayError;
use crate::relay::inbound::{ForwardSpec, InboundRequest};

/// Everything needed to issue one upstream call.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Joins a fixed origin with per-call paths and bodies.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    origin: String,
    base_path: String,
}

impl RequestBuilder {
    pub fn new(origin: &str) -> Self {
        let origin = origin.trim_end_matches('/').to_string();
        let base_path = Url::parse(&origin)
            .map(|url| url.path().trim_end_matches('/').to_string())
            .unwrap_or_default();
        Self { origin, base_path }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// `origin + upstream path (+ ?inbound query)`.
    pub fn url_for(&self, upstream_path: &str, raw_query: Option<&str>) -> Result<Url, RelayError> {
        let mut url = String::with_capacity(self.origin.len() + upstream_path.len() + 16);
        url.push_str(&self.origin);
        if !upstream_path.starts_with('/') {
            url.push('/');
        }
        url.push_str(upstream_path);
        if let Some(query) = raw_query {
            url.push('?');
            url.push_str(query);
        }
        let url = Url::parse(&url).map_err(|e| RelayError::InvalidRequest {
            message: format!("cannot build upstream URL for {upstream_path:?}: {e}"),
            param: None,
        })?;
        // parsing resolves dot segments; the result must stay under the origin
        if !self.within_base(url.path()) {
            return Err(RelayError::invalid_request(format!(
                "upstream path {upstream_path:?} escapes the configured origin"
            )));
        }
        Ok(url)
    }

    fn within_base(&self, path: &str) -> bool {
        if self.base_path.is_empty() {
            return true;
        }
        match path.strip_prefix(&self.base_path) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    /// Assemble the outbound call. `headers` come from the header rewriter.
    pub fn build(
        &self,
        inbound: &InboundRequest,
        spec: &ForwardSpec,
        headers: HeaderMap,
    ) -> Result<OutboundRequest, RelayError> {
        let url = self.url_for(&spec.upstream_path, inbound.raw_query())?;

        let body = match &spec.body_override {
            Some(value) => serde_json::to_vec(value)
                .map(Bytes::from)
                .map_err(|e| RelayError::Internal(format!("cannot encode body override: {e}")))?,
            None => inbound.body().clone(),
        };

        Ok(OutboundRequest {
            method: inbound.method().clone(),
            url,
            headers,
            body,
        })
    }
}

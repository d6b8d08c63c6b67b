//! The forwarding engine.
//!
//! # States
//! ```text
//! Building → Sending → Buffering → Done
//!                    ↘ Streaming → Done
//!          ↘ Failed (transport error or deadline)
//! ```
//!
//! One attempt per call. The deadline covers sending and, for buffered
//! calls, reading the body; a started stream has no deadline.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::http::{header, HeaderMap, Method, StatusCode};
use bytes::Bytes;
use futures_util::stream::{BoxStream, Stream, StreamExt};
use serde_json::Value;

use crate::config::UpstreamConfig;
use crate::net::client_pool::{ClientPool, ExecutionContext};
use crate::relay::builder::RequestBuilder;
use crate::relay::error::{is_benign_close, RelayError};
use crate::relay::inbound::{ForwardSpec, InboundRequest};
use crate::relay::streaming::{decide, is_event_stream, StreamDecision, StreamInputs};
use crate::resilience::Deadline;
use crate::security::headers::{strip_hop_by_hop, HeaderRewriter, InvalidHeaderConfig};

/// Response chunks, in upstream order.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes, RelayError>> + Send>>;

/// Outcome of a relayed call. Once returned the forwarder holds no state about it.
pub enum RelayResult {
    Buffered {
        status: StatusCode,
        headers: HeaderMap,
        body: Bytes,
    },
    Streamed {
        status: StatusCode,
        headers: HeaderMap,
        chunks: ChunkStream,
    },
}

impl RelayResult {
    pub fn status(&self) -> StatusCode {
        match self {
            RelayResult::Buffered { status, .. } | RelayResult::Streamed { status, .. } => *status,
        }
    }

    pub fn headers(&self) -> &HeaderMap {
        match self {
            RelayResult::Buffered { headers, .. } | RelayResult::Streamed { headers, .. } => headers,
        }
    }

    pub fn is_streamed(&self) -> bool {
        matches!(self, RelayResult::Streamed { .. })
    }
}

impl fmt::Debug for RelayResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayResult::Buffered { status, headers, body } => f
                .debug_struct("Buffered")
                .field("status", status)
                .field("headers", headers)
                .field("body_len", &body.len())
                .finish(),
            RelayResult::Streamed { status, headers, .. } => f
                .debug_struct("Streamed")
                .field("status", status)
                .field("headers", headers)
                .finish_non_exhaustive(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RelayPhase {
    Building,
    Sending,
    Buffering,
    Streaming,
    Done,
    Failed,
}

impl fmt::Display for RelayPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RelayPhase::Building => "building",
            RelayPhase::Sending => "sending",
            RelayPhase::Buffering => "buffering",
            RelayPhase::Streaming => "streaming",
            RelayPhase::Done => "done",
            RelayPhase::Failed => "failed",
        })
    }
}

/// Relays inbound requests to the single configured upstream.
pub struct RelayForwarder {
    rewriter: HeaderRewriter,
    builder: RequestBuilder,
    pool: Arc<ClientPool>,
    context: ExecutionContext,
    timeout: Duration,
}

impl RelayForwarder {
    pub fn new(
        config: &UpstreamConfig,
        pool: Arc<ClientPool>,
        context: ExecutionContext,
    ) -> Result<Self, InvalidHeaderConfig> {
        Ok(Self {
            rewriter: HeaderRewriter::new(config)?,
            builder: RequestBuilder::new(&config.origin),
            pool,
            context,
            timeout: config.timeout(),
        })
    }

    /// Replace the end-to-end deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn pool(&self) -> &Arc<ClientPool> {
        &self.pool
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// Decide how `inbound` would be relayed under `spec`, without sending it.
    pub fn stream_decision(&self, inbound: &InboundRequest, spec: &ForwardSpec) -> StreamDecision {
        let sniffed = match spec.body_override {
            Some(_) => None,
            None => sniff_json(inbound),
        };
        decide(StreamInputs {
            hint: spec.stream_hint,
            body: spec.body_override.as_ref().or(sniffed.as_ref()),
            headers: inbound.headers(),
            stream_query: inbound.query_param("stream"),
        })
    }

    /// Relay one inbound request upstream.
    pub async fn forward(
        &self,
        inbound: &InboundRequest,
        spec: ForwardSpec,
    ) -> Result<RelayResult, RelayError> {
        let result = self.run(inbound, spec).await;
        if let Err(e) = &result {
            tracing::trace!(phase = %RelayPhase::Failed, kind = %e.kind(), "Relay failed");
        }
        result
    }

    async fn run(&self, inbound: &InboundRequest, spec: ForwardSpec) -> Result<RelayResult, RelayError> {
        tracing::trace!(phase = %RelayPhase::Building, upstream_path = %spec.upstream_path);
        let decision = self.stream_decision(inbound, &spec);
        let headers = self.rewriter.rewrite(
            inbound.headers(),
            &spec.upstream_path,
            spec.body_override.is_some(),
        );
        let outbound = self.builder.build(inbound, &spec, headers)?;

        tracing::debug!(
            method = %outbound.method,
            url = %outbound.url,
            streaming = decision.is_streaming,
            trigger = %decision.trigger,
            "Relaying request"
        );

        tracing::trace!(phase = %RelayPhase::Sending);
        let client = self.pool.acquire(&self.context)?;
        let mut request = client
            .http()
            .request(outbound.method.clone(), outbound.url)
            .headers(outbound.headers);
        if !outbound.body.is_empty() || method_expects_body(&outbound.method) {
            request = request.body(outbound.body);
        }

        let deadline = Deadline::after(self.timeout);
        let response = deadline
            .run(async { request.send().await.map_err(RelayError::from_transport) })
            .await?;

        let status = response.status();
        let headers = strip_hop_by_hop(response.headers());

        if decision.is_streaming {
            let content_type = response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok());
            if status.as_u16() >= 400 && !is_event_stream(content_type) {
                let decision = decision.downgrade();
                tracing::debug!(
                    status = status.as_u16(),
                    trigger = %decision.trigger,
                    "Upstream rejected streaming request, relaying error body"
                );
            } else {
                tracing::trace!(phase = %RelayPhase::Streaming, status = status.as_u16());
                return Ok(RelayResult::Streamed {
                    status,
                    headers,
                    chunks: Box::pin(UpstreamChunks::new(response)),
                });
            }
        }

        tracing::trace!(phase = %RelayPhase::Buffering, status = status.as_u16());
        let body = deadline
            .run(async { response.bytes().await.map_err(RelayError::from_transport) })
            .await?;

        tracing::trace!(phase = %RelayPhase::Done, status = status.as_u16(), bytes = body.len());
        Ok(RelayResult::Buffered {
            status,
            headers,
            body,
        })
    }
}

fn method_expects_body(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

/// Parse the raw body for the `stream` flag when it claims to be JSON.
fn sniff_json(inbound: &InboundRequest) -> Option<Value> {
    if inbound.body().is_empty() || !inbound.has_json_body() {
        return None;
    }
    serde_json::from_slice(inbound.body()).ok()
}

/// Lazy, finite, non-restartable view over an upstream body.
///
/// Dropping it drops the upstream response, which closes that connection
/// instead of draining it.
pub struct UpstreamChunks {
    inner: Option<BoxStream<'static, reqwest::Result<Bytes>>>,
}

impl UpstreamChunks {
    pub fn new(response: reqwest::Response) -> Self {
        Self {
            inner: Some(response.bytes_stream().boxed()),
        }
    }
}

impl Stream for UpstreamChunks {
    type Item = Result<Bytes, RelayError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            let Some(inner) = self.inner.as_mut() else {
                return Poll::Ready(None);
            };
            match inner.as_mut().poll_next(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(Ok(chunk))) if chunk.is_empty() => continue,
                Poll::Ready(Some(Ok(chunk))) => return Poll::Ready(Some(Ok(chunk))),
                Poll::Ready(Some(Err(e))) => {
                    self.inner = None;
                    if is_benign_close(&e) {
                        tracing::debug!(error = %e, "Upstream stream closed early");
                        return Poll::Ready(None);
                    }
                    return Poll::Ready(Some(Err(RelayError::from_transport(e))));
                }
                Poll::Ready(None) => {
                    self.inner = None;
                    return Poll::Ready(None);
                }
            }
        }
    }
}

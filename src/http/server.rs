//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with relay and discovery handlers
//! - Wire up middleware (request ID, tracing, access control, body limit)
//! - Resolve route families and hand requests to the forwarder
//! - Serve until shutdown, then release upstream clients

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{
        rejection::{BytesRejection, FailedToBufferBody},
        DefaultBodyLimit, State,
    },
    http::{header, HeaderMap, HeaderValue, Method, Request, Uri},
    middleware,
    response::{IntoResponse, Response},
    routing::{any, get},
    Router,
};
use bytes::Bytes;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::config::RelayConfig;
use crate::http::discovery;
use crate::http::middleware::access_control_middleware;
use crate::http::request::{propagate_request_id_layer, request_id, set_request_id_layer};
use crate::lifecycle::shutdown;
use crate::net::client_pool::{ClientPool, ClientSettings, ExecutionContext};
use crate::observability::metrics;
use crate::relay::{ForwardSpec, InboundRequest, RelayError, RelayForwarder, RelayResult};
use crate::routing::{self, BodyMode};
use crate::security::access_control::AuthGate;
use crate::security::headers::InvalidHeaderConfig;

/// Family label used for requests that never resolved to a family.
const NO_FAMILY: &str = "none";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub forwarder: Arc<RelayForwarder>,
    pub config: Arc<RelayConfig>,
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Header(#[from] InvalidHeaderConfig),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// HTTP server for the relay.
pub struct HttpServer {
    router: Router,
    config: Arc<RelayConfig>,
    forwarder: Arc<RelayForwarder>,
}

impl HttpServer {
    /// Create a server with its own client pool and execution context.
    pub fn new(config: RelayConfig) -> Result<Self, ServerError> {
        let pool = Arc::new(ClientPool::new(ClientSettings::from_config(&config.upstream)));
        let forwarder = RelayForwarder::new(&config.upstream, pool, ExecutionContext::new())?;
        Ok(Self::with_forwarder(config, forwarder))
    }

    /// Create a server around an already configured forwarder.
    pub fn with_forwarder(config: RelayConfig, forwarder: RelayForwarder) -> Self {
        let config = Arc::new(config);
        let forwarder = Arc::new(forwarder);
        let state = AppState {
            forwarder: forwarder.clone(),
            config: config.clone(),
        };
        let router = Self::build_router(&config, state);
        Self {
            router,
            config,
            forwarder,
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &RelayConfig, state: AppState) -> Router {
        let gate = Arc::new(AuthGate::new(&config.auth));
        Router::new()
            .route("/health", get(discovery::health))
            .route("/.well-known/ai-plugin.json", get(discovery::manifest))
            .route("/openapi.json", get(discovery::openapi))
            .route("/v1/{*path}", any(relay_handler))
            .fallback(not_found)
            .with_state(state)
            .layer(DefaultBodyLimit::max(config.listener.max_body_bytes))
            .layer(middleware::from_fn_with_state(gate, access_control_middleware))
            .layer(propagate_request_id_layer())
            .layer(
                TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
                    tracing::info_span!(
                        "request",
                        method = %req.method(),
                        path = %req.uri().path(),
                        request_id = %request_id(req),
                    )
                }),
            )
            .layer(set_request_id_layer())
    }

    /// The fully layered router, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires, then drain and release upstream clients.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = %self.config.upstream.origin,
            auth_enabled = self.config.auth.enabled,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown::wait(shutdown))
            .await?;

        self.forwarder.pool().release_all();
        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn forwarder(&self) -> &Arc<RelayForwarder> {
        &self.forwarder
    }
}

/// Main relay handler.
/// Resolves the route family, validates the body and forwards upstream.
async fn relay_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let start = Instant::now();
    let method_str = method.as_str().to_string();
    let path = uri.path().to_string();

    let (family, result) = relay(&state, method, &uri, headers, body).await;

    match result {
        Ok(result) => {
            let status = result.status().as_u16();
            metrics::record_request(&method_str, status, family, start);
            if result.is_streamed() {
                metrics::record_stream_started(family);
            }
            tracing::info!(
                family,
                status,
                streamed = result.is_streamed(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Relayed request"
            );
            result.into_response()
        }
        Err(e) => {
            let status = e.status().as_u16();
            metrics::record_request(&method_str, status, family, start);
            metrics::record_error(e.kind().as_str());
            if status >= 500 {
                tracing::error!(family, path = %path, status, kind = %e.kind(), error = %e, "Relay failed");
            } else {
                tracing::warn!(family, path = %path, status, kind = %e.kind(), error = %e, "Request rejected");
            }
            e.into_response()
        }
    }
}

async fn relay(
    state: &AppState,
    method: Method,
    uri: &Uri,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> (&'static str, Result<RelayResult, RelayError>) {
    let Some(route) = routing::resolve(uri.path()) else {
        return (NO_FAMILY, Err(RelayError::UnknownRoute(uri.path().to_string())));
    };

    let body = match body {
        Ok(body) => body,
        Err(BytesRejection::FailedToBufferBody(FailedToBufferBody::LengthLimitError(_))) => {
            let limit = state.config.listener.max_body_bytes;
            return (route.family, Err(RelayError::PayloadTooLarge { limit }));
        }
        Err(rejection) => {
            return (route.family, Err(RelayError::invalid_request(rejection.body_text())));
        }
    };

    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());
    let json_route = route.body == BodyMode::Json && !body.is_empty();
    let mut headers = headers;
    if json_route && !headers.contains_key(header::CONTENT_TYPE) {
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }
    let inbound = InboundRequest::new(method, path_and_query, headers, body);

    // Validated only; the caller's bytes go upstream untouched.
    if json_route && inbound.has_json_body() {
        if let Err(e) = inbound.json_body() {
            return (route.family, Err(e));
        }
    }

    let spec = ForwardSpec::to(route.upstream_path);
    (route.family, state.forwarder.forward(&inbound, spec).await)
}

/// Fallback for paths outside every family and discovery route.
async fn not_found(uri: Uri) -> Response {
    metrics::record_error(crate::relay::ErrorKind::NotFound.as_str());
    RelayError::UnknownRoute(uri.path().to_string()).into_response()
}

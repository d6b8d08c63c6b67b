//! Access Control Middleware.
//! Rejects requests without a valid local access key before any handler runs.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::http::request::request_id;
use crate::observability::metrics;
use crate::relay::RelayError;
use crate::security::access_control::{AuthDecision, AuthGate};

pub async fn access_control_middleware(
    State(gate): State<Arc<AuthGate>>,
    req: Request,
    next: Next,
) -> Response {
    match gate.check(req.uri().path(), req.headers()) {
        AuthDecision::Authorized => next.run(req).await,
        AuthDecision::Unauthorized(reason) => {
            warn!(
                request_id = %request_id(&req),
                path = %req.uri().path(),
                reason = reason.as_str(),
                "Rejected request without valid access key"
            );
            metrics::record_auth_rejected(reason.as_str());
            RelayError::Unauthorized(reason).into_response()
        }
    }
}

//! Unauthenticated discovery endpoints: health, plugin manifest, API schema.

use axum::{extract::State, Json};
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::http::server::AppState;
use crate::routing::{BodyMode, ROUTE_FAMILIES};

#[derive(Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health() -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn manifest(State(state): State<AppState>) -> Json<Value> {
    let auth = if state.config.auth.enabled {
        json!({ "type": "service_http", "authorization_type": "bearer" })
    } else {
        json!({ "type": "none" })
    };
    Json(json!({
        "schema_version": "v1",
        "name_for_human": "OpenAI Relay",
        "name_for_model": "openai_relay",
        "description_for_human": "Relays OpenAI API calls through a single gateway.",
        "description_for_model": "Forward OpenAI-compatible API requests under /v1 to the configured upstream.",
        "auth": auth,
        "api": { "type": "openapi", "url": "/openapi.json" },
    }))
}

pub async fn openapi() -> Json<Value> {
    Json(openapi_document())
}

/// Minimal document listing every relayed family.
pub fn openapi_document() -> Value {
    let mut paths = Map::new();
    for family in ROUTE_FAMILIES {
        let content = match family.body {
            BodyMode::Json => "application/json",
            BodyMode::Passthrough => "*/*",
        };
        paths.insert(
            format!("/v1{}", family.prefix()),
            json!({
                "summary": format!("{} (relayed)", family.name),
                "x-relay-family": family.name,
                "x-relay-body": family.body,
                "post": {
                    "requestBody": { "content": Value::Object(request_content(content)) },
                    "responses": { "default": { "description": "Upstream response, relayed verbatim" } }
                }
            }),
        );
    }
    json!({
        "openapi": "3.0.1",
        "info": { "title": "OpenAI Relay", "version": env!("CARGO_PKG_VERSION") },
        "paths": paths,
    })
}

fn request_content(media_type: &str) -> Map<String, Value> {
    let mut content = Map::new();
    content.insert(media_type.to_string(), json!({}));
    content
}

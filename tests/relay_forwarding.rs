//! End-to-end forwarding behavior against mock upstreams.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::response::Response;
use futures_util::StreamExt;
use tower::ServiceExt;

use openai_relay::config::RelayConfig;
use openai_relay::http::HttpServer;
use openai_relay::net::{ClientPool, ClientSettings, ExecutionContext};
use openai_relay::relay::RelayForwarder;

mod common;
use common::{authorized_get, authorized_post, body_bytes, body_json, MockUpstream};

const SSE_HEAD: &[u8] =
    b"HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nTransfer-Encoding: chunked\r\n\r\n";
const SSE_CHUNK_1: &[u8] = b"f\r\ndata: {\"n\":1}\n\n\r\n";
const SSE_CHUNK_2: &[u8] = b"f\r\ndata: {\"n\":2}\n\n\r\n";
const SSE_END: &[u8] = b"0\r\n\r\n";
// announces 15 bytes, delivers 9, then the socket closes
const SSE_CUT: &[u8] = b"f\r\ndata: {\"n";

fn server(config: RelayConfig) -> HttpServer {
    HttpServer::new(config).unwrap()
}

fn server_with_timeout(config: RelayConfig, timeout: Duration) -> HttpServer {
    let pool = Arc::new(ClientPool::new(ClientSettings::from_config(&config.upstream)));
    let forwarder = RelayForwarder::new(&config.upstream, pool, ExecutionContext::new())
        .unwrap()
        .with_timeout(timeout);
    HttpServer::with_forwarder(config, forwarder)
}

async fn send(server: &HttpServer, request: Request<Body>) -> Response {
    server.router().oneshot(request).await.unwrap()
}

#[tokio::test]
async fn test_buffered_body_is_byte_identical() {
    // odd spacing proves the body is not re-serialized
    const BODY: &str = "{ \"object\": \"list\",\n  \"data\": [ {\"id\":\"gpt-4o\"} ] }";
    let raw: &'static [u8] = Box::leak(
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\nX-Upstream: yes\r\n\r\n{}",
            BODY.len(),
            BODY
        )
        .into_bytes()
        .into_boxed_slice(),
    );
    let addr = common::start_fixed_upstream(raw).await;
    let server = server(common::relay_config(&format!("http://{addr}/v1")));

    let response = send(&server, authorized_get("/v1/models")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "application/json");
    assert_eq!(response.headers()["x-upstream"], "yes");
    assert!(response.headers().get("connection").is_none());
    assert!(response.headers().get("x-accel-buffering").is_none());
    assert_eq!(&body_bytes(response).await[..], BODY.as_bytes());
}

#[tokio::test]
async fn test_sse_chunks_arrive_in_order() {
    let addr = common::start_scripted_upstream(vec![
        (Duration::ZERO, SSE_HEAD),
        (Duration::from_millis(50), SSE_CHUNK_1),
        (Duration::from_millis(100), SSE_CHUNK_2),
        (Duration::from_millis(50), SSE_END),
    ])
    .await;
    let server = server(common::relay_config(&format!("http://{addr}/v1")));

    let response = send(
        &server,
        authorized_post("/v1/chat/completions", r#"{"model":"gpt-4o","stream":true}"#),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/event-stream");
    assert_eq!(response.headers()["x-accel-buffering"], "no");

    let chunks: Vec<_> = response
        .into_body()
        .into_data_stream()
        .collect::<Vec<_>>()
        .await;
    let chunks: Vec<_> = chunks.into_iter().map(|c| c.unwrap()).collect();
    assert_eq!(chunks.len(), 2);
    assert_eq!(&chunks[0][..], b"data: {\"n\":1}\n\n");
    assert_eq!(&chunks[1][..], b"data: {\"n\":2}\n\n");
}

#[tokio::test]
async fn test_stream_over_socket_with_accept_header() {
    let addr = common::start_scripted_upstream(vec![
        (Duration::ZERO, SSE_HEAD),
        (Duration::from_millis(20), SSE_CHUNK_1),
        (Duration::from_millis(20), SSE_CHUNK_2),
        (Duration::from_millis(20), SSE_END),
    ])
    .await;
    let server = server(common::relay_config(&format!("http://{addr}/v1")));
    let (relay_addr, _shutdown) = common::start_relay(server).await;

    // no body flag: Accept alone opts into streaming
    let response = reqwest::Client::new()
        .post(format!("http://{relay_addr}/v1/responses"))
        .header("authorization", format!("Bearer {}", common::ACCESS_KEY))
        .header("accept", "text/event-stream")
        .json(&serde_json::json!({"model": "gpt-4o", "input": "hi"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert!(response.headers().get("x-request-id").is_some());
    assert_eq!(response.headers()["x-accel-buffering"], "no");
    let text = response.text().await.unwrap();
    assert_eq!(text, "data: {\"n\":1}\n\ndata: {\"n\":2}\n\n");
}

#[tokio::test]
async fn test_truncated_stream_ends_without_error() {
    let addr = common::start_scripted_upstream(vec![
        (Duration::ZERO, SSE_HEAD),
        (Duration::from_millis(20), SSE_CHUNK_1),
        (Duration::from_millis(20), SSE_CUT),
    ])
    .await;
    let server = server(common::relay_config(&format!("http://{addr}/v1")));

    let response = send(
        &server,
        authorized_post("/v1/chat/completions", r#"{"model":"gpt-4o","stream":true}"#),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let items: Vec<_> = response.into_body().into_data_stream().collect().await;
    assert!(!items.is_empty());
    assert!(items.iter().all(Result::is_ok), "stream surfaced an error: {items:?}");
    assert_eq!(&items[0].as_ref().unwrap()[..], b"data: {\"n\":1}\n\n");
}

#[tokio::test]
async fn test_client_disconnect_closes_upstream_stream() {
    let (addr, hung_up) =
        common::start_endless_stream(SSE_HEAD, SSE_CHUNK_1, Duration::from_millis(20)).await;
    let server = server(common::relay_config(&format!("http://{addr}/v1")));

    let response = send(
        &server,
        authorized_post("/v1/chat/completions", r#"{"model":"gpt-4o","stream":true}"#),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let mut body = response.into_body().into_data_stream();
    let first = body.next().await.unwrap().unwrap();
    assert!(first.starts_with(b"data: {\"n\":1}"));
    drop(body);

    tokio::time::timeout(Duration::from_secs(2), hung_up)
        .await
        .expect("upstream kept streaming after the client left")
        .unwrap();
}

#[tokio::test]
async fn test_stream_outlives_request_deadline() {
    let addr = common::start_scripted_upstream(vec![
        (Duration::ZERO, SSE_HEAD),
        (Duration::from_millis(150), SSE_CHUNK_1),
        (Duration::from_millis(150), SSE_CHUNK_2),
        (Duration::from_millis(100), SSE_END),
    ])
    .await;
    let server = server_with_timeout(
        common::relay_config(&format!("http://{addr}/v1")),
        Duration::from_millis(150),
    );

    let started = std::time::Instant::now();
    let response = send(
        &server,
        authorized_post("/v1/chat/completions", r#"{"model":"gpt-4o","stream":true}"#),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let items: Vec<_> = response.into_body().into_data_stream().collect().await;
    let chunks: Vec<_> = items.into_iter().map(|c| c.unwrap()).collect();
    assert_eq!(chunks.len(), 2);
    assert_eq!(&chunks[1][..], b"data: {\"n\":2}\n\n");
    assert!(started.elapsed() >= Duration::from_millis(300));
}

#[tokio::test]
async fn test_streaming_request_with_upstream_error_is_buffered() {
    const ERROR: &str = r#"{"error":{"message":"model overloaded","type":"server_error"}}"#;
    let upstream = MockUpstream::json(500, ERROR).await;
    let server = server(common::relay_config(&upstream.origin()));

    let response = send(
        &server,
        authorized_post("/v1/chat/completions", r#"{"model":"gpt-4o","stream":true}"#),
    )
    .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.headers()["content-type"], "application/json");
    assert!(response.headers().get("x-accel-buffering").is_none());
    assert_eq!(&body_bytes(response).await[..], ERROR.as_bytes());
    assert_eq!(upstream.hits(), 1);
}

#[tokio::test]
async fn test_upstream_client_errors_relayed_verbatim() {
    const ERROR: &str = r#"{"error":{"message":"No such model","code":"model_not_found"}}"#;
    let upstream = MockUpstream::json(404, ERROR).await;
    let server = server(common::relay_config(&upstream.origin()));

    let response = send(&server, authorized_get("/v1/models/nope")).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(&body_bytes(response).await[..], ERROR.as_bytes());
}

#[tokio::test]
async fn test_refused_connection_is_unreachable() {
    let addr = common::closed_port().await;
    let server = server(common::relay_config(&format!("http://{addr}/v1")));

    let response = send(&server, authorized_post("/v1/embeddings", r#"{"input":"x"}"#)).await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert_eq!(body["error"]["type"], "upstream_unreachable");
}

#[tokio::test]
async fn test_slow_upstream_times_out() {
    let addr = common::start_scripted_upstream(vec![(
        Duration::from_secs(5),
        b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\n{}",
    )])
    .await;
    let server = server_with_timeout(
        common::relay_config(&format!("http://{addr}/v1")),
        Duration::from_millis(200),
    );

    let started = std::time::Instant::now();
    let response = send(&server, authorized_get("/v1/models")).await;

    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    assert!(started.elapsed() < Duration::from_secs(4));
    let body = body_json(response).await;
    assert_eq!(body["error"]["type"], "upstream_timeout");
}

#[tokio::test]
async fn test_upstream_sees_server_credentials_and_single_beta_token() {
    let upstream = MockUpstream::json(200, r#"{"id":"asst_1"}"#).await;
    let mut config = common::relay_config(&upstream.origin());
    config.upstream.organization = Some("org-relay".into());
    let server = server(config);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/v1/assistants")
        .header("authorization", format!("Bearer {}", common::ACCESS_KEY))
        .header("content-type", "application/json")
        .header("openai-beta", "assistants=v2")
        .header("openai-organization", "org-caller")
        .body(Body::from(r#"{"model":"gpt-4o"}"#))
        .unwrap();
    let response = send(&server, request).await;
    assert_eq!(response.status(), StatusCode::OK);

    let seen = upstream.last_request();
    assert_eq!(seen.path, "/v1/assistants");
    assert_eq!(
        seen.header("authorization"),
        Some(format!("Bearer {}", common::UPSTREAM_KEY).as_str())
    );
    assert_eq!(seen.header("openai-organization"), Some("org-relay"));
    let beta = seen.header("openai-beta").unwrap();
    assert_eq!(beta.matches("assistants=v2").count(), 1);
}

#[tokio::test]
async fn test_inbound_framing_headers_are_not_forwarded() {
    let upstream = MockUpstream::json(200, "{}").await;
    let server = server(common::relay_config(&upstream.origin()));

    let request = Request::builder()
        .method(Method::POST)
        .uri("/v1/embeddings")
        .header("host", "client.example")
        .header("authorization", format!("Bearer {}", common::ACCESS_KEY))
        .header("content-type", "application/json")
        .header("content-length", "999")
        .header("transfer-encoding", "chunked")
        .header("x-api-key", common::ACCESS_KEY)
        .body(Body::from(r#"{ "input": "hello", "model": "text-embedding-3-small" }"#))
        .unwrap();
    let response = send(&server, request).await;
    assert_eq!(response.status(), StatusCode::OK);

    let seen = upstream.last_request();
    assert_eq!(seen.header("host"), Some(upstream.addr.to_string().as_str()));
    assert!(seen.header("transfer-encoding").is_none());
    assert!(seen.header("x-api-key").is_none());
    assert_eq!(
        seen.header("content-length"),
        Some(seen.body.len().to_string().as_str())
    );
    assert_eq!(seen.header("content-type"), Some("application/json"));

    let forwarded: serde_json::Value = serde_json::from_slice(&seen.body).unwrap();
    assert_eq!(
        forwarded,
        serde_json::json!({"input": "hello", "model": "text-embedding-3-small"})
    );
}

#[tokio::test]
async fn test_json_body_is_forwarded_byte_identical() {
    // wider than u64 and f64 can carry
    const BODY: &str = r#"{"model":"gpt-4o","seed":123456789012345678901234567890,"temperature":0.10000000000000000555}"#;
    let upstream = MockUpstream::json(200, "{}").await;
    let server = server(common::relay_config(&upstream.origin()));

    let response = send(&server, authorized_post("/v1/chat/completions", BODY)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let seen = upstream.last_request();
    assert_eq!(&seen.body[..], BODY.as_bytes());
    assert_eq!(seen.header("content-type"), Some("application/json"));
}

#[tokio::test]
async fn test_json_body_without_content_type_is_labelled() {
    let upstream = MockUpstream::json(200, "{}").await;
    let server = server(common::relay_config(&upstream.origin()));

    let request = Request::builder()
        .method(Method::POST)
        .uri("/v1/moderations")
        .header("authorization", format!("Bearer {}", common::ACCESS_KEY))
        .body(Body::from(r#"{"input":"hi"}"#))
        .unwrap();
    let response = send(&server, request).await;
    assert_eq!(response.status(), StatusCode::OK);

    let seen = upstream.last_request();
    assert_eq!(seen.header("content-type"), Some("application/json"));
    assert_eq!(&seen.body[..], br#"{"input":"hi"}"#);
}

#[tokio::test]
async fn test_beta_only_surfaces_are_relayed_with_tokens() {
    let upstream = MockUpstream::json(200, "{}").await;
    let server = server(common::relay_config(&upstream.origin()));

    let response = send(&server, authorized_post("/v1/tools", r#"{"name":"lookup"}"#)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let seen = upstream.last_request();
    assert_eq!(seen.path, "/v1/tools");
    assert_eq!(seen.header("openai-beta"), Some("assistants=v2"));

    let response = send(&server, authorized_get("/v1/vector-stores/vs_1")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(upstream.last_request().header("openai-beta"), Some("assistants=v2"));

    let response = send(&server, authorized_get("/v1/audio-pro/voices")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let seen = upstream.last_request();
    assert_eq!(seen.path, "/v1/audio-pro/voices");
    assert_eq!(seen.header("openai-beta"), Some("video=v1"));

    assert_eq!(upstream.hits(), 3);
}

#[tokio::test]
async fn test_query_string_passes_through_in_order() {
    let upstream = MockUpstream::json(200, r#"{"data":[]}"#).await;
    let server = server(common::relay_config(&upstream.origin()));

    let response = send(
        &server,
        authorized_get("/v1/files?purpose=fine-tune&limit=2&purpose=batch"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let seen = upstream.last_request();
    assert_eq!(seen.method, Method::GET);
    assert_eq!(seen.path, "/v1/files");
    assert_eq!(seen.query.as_deref(), Some("purpose=fine-tune&limit=2&purpose=batch"));
}

#[tokio::test]
async fn test_passthrough_body_is_forwarded_untouched() {
    const MULTIPART: &str =
        "--b\r\nContent-Disposition: form-data; name=\"purpose\"\r\n\r\nassistants\r\n--b--\r\n";
    let upstream = MockUpstream::json(200, r#"{"id":"file-1"}"#).await;
    let server = server(common::relay_config(&upstream.origin()));

    let request = Request::builder()
        .method(Method::POST)
        .uri("/v1/files")
        .header("authorization", format!("Bearer {}", common::ACCESS_KEY))
        .header("content-type", "multipart/form-data; boundary=b")
        .body(Body::from(MULTIPART))
        .unwrap();
    let response = send(&server, request).await;
    assert_eq!(response.status(), StatusCode::OK);

    let seen = upstream.last_request();
    assert_eq!(&seen.body[..], MULTIPART.as_bytes());
    assert_eq!(seen.header("content-type"), Some("multipart/form-data; boundary=b"));
}

#[tokio::test]
async fn test_shutdown_releases_pool() {
    let upstream = MockUpstream::json(200, "{}").await;
    let server = server(common::relay_config(&upstream.origin()));
    let forwarder = server.forwarder().clone();
    let (relay_addr, shutdown) = common::start_relay(server).await;

    let response = reqwest::Client::new()
        .get(format!("http://{relay_addr}/v1/models"))
        .header("x-api-key", common::ACCESS_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(forwarder.pool().len(), 1);

    shutdown.trigger();
    for _ in 0..50 {
        if forwarder.pool().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(forwarder.pool().is_empty());
}

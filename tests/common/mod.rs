//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::Body,
    http::{HeaderMap, Method, Request, Uri},
    response::Response,
    Router,
};
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

use openai_relay::config::RelayConfig;
use openai_relay::http::HttpServer;
use openai_relay::lifecycle::Shutdown;

pub const UPSTREAM_KEY: &str = "sk-upstream-secret";
pub const ACCESS_KEY: &str = "local-access-key";

/// A request as the upstream saw it.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

type Responder = dyn Fn(&CapturedRequest) -> Response + Send + Sync;

/// An axum upstream that records every request and answers via a closure.
pub struct MockUpstream {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    captured: Arc<Mutex<Vec<CapturedRequest>>>,
}

impl MockUpstream {
    pub async fn start<F>(respond: F) -> Self
    where
        F: Fn(&CapturedRequest) -> Response + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let captured = Arc::new(Mutex::new(Vec::new()));
        let respond: Arc<Responder> = Arc::new(respond);

        let app = {
            let hits = hits.clone();
            let captured = captured.clone();
            Router::new().fallback(
                move |method: Method, uri: Uri, headers: HeaderMap, body: Bytes| {
                    let hits = hits.clone();
                    let captured = captured.clone();
                    let respond = respond.clone();
                    async move {
                        hits.fetch_add(1, Ordering::SeqCst);
                        let request = CapturedRequest {
                            method,
                            path: uri.path().to_string(),
                            query: uri.query().map(str::to_string),
                            headers,
                            body,
                        };
                        let response = respond(&request);
                        captured.lock().unwrap().push(request);
                        response
                    }
                },
            )
        };

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            hits,
            captured,
        }
    }

    /// Upstream answering every call with a JSON body.
    pub async fn json(status: u16, body: &'static str) -> Self {
        Self::start(move |_| {
            Response::builder()
                .status(status)
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap()
        })
        .await
    }

    pub fn origin(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> CapturedRequest {
        self.captured
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("upstream saw no request")
    }
}

/// Raw TCP upstream that writes scripted bytes, pausing before each part.
///
/// Reads the request head (and any `Content-Length` body) first so the
/// client never sees a reset.
pub async fn start_scripted_upstream(parts: Vec<(Duration, &'static [u8])>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let parts = Arc::new(parts);

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let parts = parts.clone();
            tokio::spawn(async move {
                read_request(&mut socket).await;
                for (delay, bytes) in parts.iter() {
                    tokio::time::sleep(*delay).await;
                    if socket.write_all(bytes).await.is_err() {
                        return;
                    }
                    let _ = socket.flush().await;
                }
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

/// Raw TCP upstream that writes `head`, then `chunk` every `interval`, until
/// the peer goes away. The receiver fires once it has.
pub async fn start_endless_stream(
    head: &'static [u8],
    chunk: &'static [u8],
    interval: Duration,
) -> (SocketAddr, oneshot::Receiver<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (hung_up, rx) = oneshot::channel();

    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        read_request(&mut socket).await;
        let (mut reader, mut writer) = socket.split();
        let mut buf = [0u8; 256];
        if writer.write_all(head).await.is_ok() {
            loop {
                tokio::select! {
                    read = reader.read(&mut buf) => match read {
                        Ok(0) | Err(_) => break,
                        Ok(_) => {}
                    },
                    _ = tokio::time::sleep(interval) => {
                        if writer.write_all(chunk).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }
        let _ = hung_up.send(());
    });

    (addr, rx)
}

/// Raw TCP upstream that writes one fixed response.
pub async fn start_fixed_upstream(response: &'static [u8]) -> SocketAddr {
    start_scripted_upstream(vec![(Duration::ZERO, response)]).await
}

async fn read_request(socket: &mut TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    };
    let head = String::from_utf8_lossy(&buf[..head_end]).to_ascii_lowercase();
    let content_length = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < head_end + content_length {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Relay config pointed at `origin`, with the access gate on.
pub fn relay_config(origin: &str) -> RelayConfig {
    let mut config = RelayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.upstream.origin = origin.to_string();
    config.upstream.api_key = UPSTREAM_KEY.into();
    config.upstream.connect_timeout_secs = 2;
    config.auth.enabled = true;
    config.auth.access_key = ACCESS_KEY.into();
    config
}

/// Serve `server` on an ephemeral port. Dropping the returned `Shutdown` stops it.
pub async fn start_relay(server: HttpServer) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        server.run(listener, rx).await.unwrap();
    });
    (addr, shutdown)
}

/// POST a JSON body with the local access key.
pub fn authorized_post(uri: &str, body: &'static str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("authorization", format!("Bearer {ACCESS_KEY}"))
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

pub fn authorized_get(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header("authorization", format!("Bearer {ACCESS_KEY}"))
        .body(Body::empty())
        .unwrap()
}

pub async fn body_bytes(response: Response) -> Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

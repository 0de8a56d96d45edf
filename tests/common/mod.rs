//! Shared utilities for integration testing.

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{HeaderMap, Request, Response, StatusCode};
use bytes::Bytes;
use http_body_util::BodyExt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use caching_proxy::cache::{ManualClock, MemoryStore, ResponseCache};
use caching_proxy::config::{OriginConfig, ProxyConfig};
use caching_proxy::http::{Forwarder, HttpServer, ProxyHandler};
use caching_proxy::lifecycle::Shutdown;

/// Fixed starting instant for clock-driven tests.
pub fn t0() -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)
}

/// `Expires` value `secs` seconds after `base`.
pub fn expires_in(base: SystemTime, secs: u64) -> String {
    httpdate::fmt_http_date(base + Duration::from_secs(secs))
}

/// What the mock origin answers with.
#[derive(Debug, Clone)]
pub struct MockReply {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub trailers: Vec<(String, String)>,
}

impl MockReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
            trailers: Vec::new(),
        }
    }

    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(200, body)
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn trailer(mut self, name: &str, value: &str) -> Self {
        self.trailers.push((name.to_string(), value.to_string()));
        self
    }

    /// Wire bytes: chunked when trailers are present, Content-Length otherwise.
    fn to_wire(&self) -> Vec<u8> {
        let reason = StatusCode::from_u16(self.status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("Unknown");

        let mut out = format!("HTTP/1.1 {} {}\r\n", self.status, reason);
        for (name, value) in &self.headers {
            out.push_str(&format!("{name}: {value}\r\n"));
        }
        out.push_str("Connection: close\r\n");

        if self.trailers.is_empty() {
            out.push_str(&format!("Content-Length: {}\r\n\r\n", self.body.len()));
            out.push_str(&self.body);
            return out.into_bytes();
        }

        let names: Vec<&str> = self.trailers.iter().map(|(n, _)| n.as_str()).collect();
        out.push_str(&format!("Trailer: {}\r\n", names.join(", ")));
        out.push_str("Transfer-Encoding: chunked\r\n\r\n");
        if !self.body.is_empty() {
            out.push_str(&format!("{:x}\r\n{}\r\n", self.body.len(), self.body));
        }
        out.push_str("0\r\n");
        for (name, value) in &self.trailers {
            out.push_str(&format!("{name}: {value}\r\n"));
        }
        out.push_str("\r\n");
        out.into_bytes()
    }
}

/// A request as seen by the mock origin.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub method: String,
    pub target: String,
    pub headers: Vec<(String, String)>,
}

impl SeenRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Handle to a running mock origin.
#[derive(Clone)]
pub struct MockOrigin {
    pub addr: SocketAddr,
    calls: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
}

impl MockOrigin {
    /// Number of requests the origin has answered.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }

    pub fn config(&self) -> OriginConfig {
        OriginConfig {
            scheme: "http".to_string(),
            host: self.addr.to_string(),
        }
    }
}

/// Start a programmable mock origin on an ephemeral port.
///
/// `reply` receives the request target (path and query).
pub async fn start_origin<F>(reply: F) -> MockOrigin
where
    F: Fn(&str) -> MockReply + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let reply = Arc::new(reply);

    let origin = MockOrigin {
        addr,
        calls: calls.clone(),
        seen: seen.clone(),
    };

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let reply = reply.clone();
            let calls = calls.clone();
            let seen = seen.clone();
            tokio::spawn(async move {
                if let Some(request) = read_request_head(socket).await {
                    let (mut socket, request) = request;
                    let response = reply(&request.target);
                    seen.lock().unwrap().push(request);
                    calls.fetch_add(1, Ordering::SeqCst);
                    let _ = socket.write_all(&response.to_wire()).await;
                    let _ = socket.shutdown().await;
                }
            });
        }
    });

    origin
}

/// Origin answering every path with a fixed reply.
pub async fn start_fixed_origin(reply: MockReply) -> MockOrigin {
    start_origin(move |_| reply.clone()).await
}

async fn read_request_head(mut socket: TcpStream) -> Option<(TcpStream, SeenRequest)> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);

        let mut headers = [httparse::EMPTY_HEADER; 64];
        let mut request = httparse::Request::new(&mut headers);
        if let Ok(httparse::Status::Complete(_)) = request.parse(&buf) {
            let seen = SeenRequest {
                method: request.method.unwrap_or_default().to_string(),
                target: request.path.unwrap_or_default().to_string(),
                headers: request
                    .headers
                    .iter()
                    .map(|h| {
                        (
                            h.name.to_string(),
                            String::from_utf8_lossy(h.value).into_owned(),
                        )
                    })
                    .collect(),
            };
            return Some((socket, seen));
        }
    }
}

/// An address nothing is listening on.
pub fn unreachable_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Handler over an in-memory store with a manual clock starting at [`t0`].
pub fn handler_with_clock(origin: OriginConfig) -> (ProxyHandler, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(t0()));
    let cache = ResponseCache::new(Arc::new(MemoryStore::new()), clock.clone());
    let handler = ProxyHandler::new(origin, Forwarder::default(), cache);
    (handler, clock)
}

pub fn get(target: &str) -> Request<Body> {
    Request::builder().uri(target).body(Body::empty()).unwrap()
}

/// Collect a response body and its trailers.
pub async fn read_body(response: Response<Body>) -> (Bytes, Option<HeaderMap>) {
    let collected = response.into_body().collect().await.unwrap();
    let trailers = collected.trailers().cloned();
    (collected.to_bytes(), trailers)
}

/// Run a proxy server around `handler` on an ephemeral port.
pub async fn start_proxy(handler: ProxyHandler) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let mut config = ProxyConfig::default();
    config.listener.bind_address = addr.to_string();
    config.origin = handler.origin().clone();

    let shutdown = Shutdown::new();
    let server = HttpServer::with_handler(config, handler);
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, rx).await;
    });

    (addr, shutdown)
}

//! Cache-aware proxy handler.
//!
//! # Request State Machine
//! ```text
//! CONFIG_CHECK
//!     origin host empty → 500, MISS, no network attempt
//! CACHE_LOOKUP
//!     fresh entry → decode → HIT (status, headers, body, trailers replayed)
//!     stale entry → evicted → MISS
//!     undecodable entry → evicted → MISS
//! FORWARD
//!     transport failure → 502, MISS
//!     response → encode once
//!              → decode the same bytes (failure → 502, nothing stored)
//!              → valid Expires? store (path, bytes, expiry)
//!              → MISS
//! ```
//!
//! # Design Decisions
//! - Cache key is the URL path only; query string and method are ignored
//! - No lock is held while talking to the origin or writing to the client
//! - The MISS path sends exactly what a later HIT will replay

use axum::body::Body;
use axum::http::{Method, Request, Response, StatusCode};
use std::time::Instant;

use crate::cache::{Expiry, Lookup, ResponseCache};
use crate::config::{OriginConfig, ProxyConfig};
use crate::error::ProxyError;
use crate::http::codec::{self, StoredResponse};
use crate::http::forwarder::Forwarder;
use crate::http::response::{failure_response, into_client_response, CacheStatus};
use crate::observability::metrics;

/// Serves requests from the cache or the origin.
#[derive(Debug, Clone)]
pub struct ProxyHandler {
    origin: OriginConfig,
    forwarder: Forwarder,
    cache: ResponseCache,
}

impl ProxyHandler {
    /// Create a handler from its parts.
    pub fn new(origin: OriginConfig, forwarder: Forwarder, cache: ResponseCache) -> Self {
        Self {
            origin,
            forwarder,
            cache,
        }
    }

    /// Handler with an in-memory cache on the system clock.
    pub fn from_config(config: &ProxyConfig) -> Self {
        Self::new(
            config.origin.clone(),
            Forwarder::new(&config.timeouts),
            ResponseCache::in_memory(),
        )
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn origin(&self) -> &OriginConfig {
        &self.origin
    }

    /// Serve one inbound request.
    pub async fn handle(&self, request: Request<Body>) -> Response<Body> {
        let start = Instant::now();
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        let (response, cache) = self.serve(request, &method, &path).await;

        tracing::info!(
            method = %method,
            path = %path,
            status = response.status().as_u16(),
            cache = cache.as_str(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Request served"
        );
        metrics::record_request(method.as_str(), response.status().as_u16(), cache.as_str(), start);
        response
    }

    async fn serve(
        &self,
        request: Request<Body>,
        method: &Method,
        path: &str,
    ) -> (Response<Body>, CacheStatus) {
        if !self.origin.is_configured() {
            tracing::error!(path = %path, error = %ProxyError::MissingOrigin, "Refusing to forward");
            return (
                failure_response(StatusCode::INTERNAL_SERVER_ERROR, CacheStatus::Miss),
                CacheStatus::Miss,
            );
        }

        if let Some(response) = self.replay(method, path) {
            metrics::record_cache_lookup("hit");
            return (response, CacheStatus::Hit);
        }
        metrics::record_cache_lookup("miss");

        match self.fetch(request, method, path).await {
            Ok(response) => (response, CacheStatus::Miss),
            Err(e) => {
                if !e.is_config() {
                    metrics::record_upstream_error();
                }
                tracing::error!(path = %path, error = %e, "Failed to serve from origin");
                (failure_response(e.status_code(), CacheStatus::Miss), CacheStatus::Miss)
            }
        }
    }

    /// HIT path: decode the fresh entry for `path`, if there is one.
    fn replay(&self, method: &Method, path: &str) -> Option<Response<Body>> {
        let entry = match self.cache.lookup(path) {
            Lookup::Hit(entry) => entry,
            Lookup::Miss => return None,
        };

        match codec::decode(&entry.raw, method) {
            Ok(stored) => {
                tracing::debug!(path = %path, "Cache HIT");
                Some(into_client_response(stored, CacheStatus::Hit))
            }
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "Discarding unreadable cache entry");
                self.cache.discard(path, &entry.raw);
                None
            }
        }
    }

    /// MISS path: forward, maybe store, and answer from the encoded bytes.
    async fn fetch(
        &self,
        request: Request<Body>,
        method: &Method,
        path: &str,
    ) -> Result<Response<Body>, ProxyError> {
        tracing::debug!(path = %path, "Cache MISS");

        let upstream = self.forwarder.forward(request, &self.origin).await?;
        let fresh = StoredResponse::collect(upstream)
            .await
            .map_err(ProxyError::UpstreamBody)?;

        let replayable = self.admit(path, method, &fresh)?;
        Ok(into_client_response(replayable, CacheStatus::Miss))
    }

    /// Encode `fresh` once, check the bytes decode, then store them if the
    /// response is cacheable. Returns what the client should be sent.
    fn admit(
        &self,
        path: &str,
        method: &Method,
        fresh: &StoredResponse,
    ) -> Result<StoredResponse, ProxyError> {
        let raw = codec::encode(fresh);
        let replayable = codec::decode(&raw, method)?;

        match Expiry::from_headers(&fresh.headers) {
            Expiry::At(expires_at) => {
                tracing::debug!(path = %path, expires = %httpdate::fmt_http_date(expires_at), "Storing response");
                self.cache.insert(path, raw, expires_at);
            }
            Expiry::Missing => {
                tracing::debug!(path = %path, "Response has no Expires header, not caching");
            }
            Expiry::Malformed(value) => {
                tracing::debug!(path = %path, expires = %value, "Unparsable Expires header, not caching");
            }
        }

        Ok(replayable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{ManualClock, MemoryStore};
    use crate::http::response::X_CACHE_STATUS;
    use axum::http::{header::EXPIRES, HeaderMap, HeaderName, HeaderValue};
    use bytes::Bytes;
    use std::sync::Arc;
    use std::time::{Duration, SystemTime};

    fn handler_at(now: SystemTime) -> ProxyHandler {
        let cache = ResponseCache::new(
            Arc::new(MemoryStore::new()),
            Arc::new(ManualClock::new(now)),
        );
        ProxyHandler::new(OriginConfig::default(), Forwarder::default(), cache)
    }

    fn cacheable(now: SystemTime) -> StoredResponse {
        let mut headers = HeaderMap::new();
        let expires = httpdate::fmt_http_date(now + Duration::from_secs(60));
        headers.insert(EXPIRES, HeaderValue::from_str(&expires).unwrap());
        StoredResponse {
            status: StatusCode::OK,
            headers,
            body: Bytes::from_static(b"payload"),
            ..Default::default()
        }
    }

    #[test]
    fn test_admit_stores_cacheable_response() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let handler = handler_at(now);

        let sent = handler.admit("/ok", &Method::GET, &cacheable(now)).unwrap();
        assert_eq!(sent.body, Bytes::from_static(b"payload"));
        assert_eq!(handler.cache().len(), 1);
    }

    #[test]
    fn test_undecodable_response_is_not_stored() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let handler = handler_at(now);

        // More header lines than decode accepts
        let mut fresh = cacheable(now);
        for i in 0..200 {
            let name = HeaderName::from_bytes(format!("x-extra-{i}").as_bytes()).unwrap();
            fresh.headers.insert(name, HeaderValue::from_static("1"));
        }

        let err = handler.admit("/wide", &Method::GET, &fresh).unwrap_err();
        assert!(matches!(err, ProxyError::Decode(_)));
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert!(handler.cache().is_empty());
    }

    #[tokio::test]
    async fn test_unconfigured_origin_fails_without_lookup() {
        let origin = OriginConfig {
            scheme: "http".to_string(),
            host: String::new(),
        };
        let handler = ProxyHandler::new(origin, Forwarder::default(), ResponseCache::in_memory());

        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = handler.handle(request).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[&X_CACHE_STATUS], "MISS");
        assert!(handler.cache().is_empty());
    }
}

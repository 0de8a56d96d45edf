//! Forwarding requests to the origin server.
//!
//! # Responsibilities
//! - Rewrite the inbound request's scheme/authority to the origin
//! - Drop server-side state and hop-by-hop headers before reuse as a client request
//! - Perform the round trip with a pooled hyper client
//!
//! # Design Decisions
//! - No retries; a failed round trip is reported once
//! - No request timeout at this layer; only the connector's connect timeout
//! - `TE: trailers` is always sent so origins may emit trailer fields

use axum::body::Body;
use axum::http::{
    header::{self, HeaderMap, HeaderName, HeaderValue},
    Request, Response, Uri, Version,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::time::Duration;

use crate::config::{OriginConfig, TimeoutConfig};
use crate::error::ProxyError;

/// Headers that only apply to a single connection.
const HOP_BY_HOP: [HeaderName; 6] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-connection"),
    header::TE,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Sends requests to the origin over a shared connection pool.
#[derive(Clone, Debug)]
pub struct Forwarder {
    client: Client<HttpConnector, Body>,
}

impl Forwarder {
    /// Create a forwarder with the given transport timeouts.
    pub fn new(timeouts: &TimeoutConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(timeouts.connect_secs)));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(timeouts.idle_secs))
            .build(connector);

        Self { client }
    }

    /// Forward `request` to `origin` and return the origin's response.
    pub async fn forward(
        &self,
        request: Request<Body>,
        origin: &OriginConfig,
    ) -> Result<Response<Body>, ProxyError> {
        let outbound = outbound_request(request, origin)?;
        tracing::debug!(
            method = %outbound.method(),
            uri = %outbound.uri(),
            "Forwarding request to origin"
        );

        let response = self.client.request(outbound).await?;

        let (mut parts, body) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers);
        Ok(Response::from_parts(parts, Body::new(body)))
    }
}

impl Default for Forwarder {
    fn default() -> Self {
        Self::new(&TimeoutConfig::default())
    }
}

/// Rebuild an inbound request as a client request aimed at `origin`.
///
/// The result has an absolute URI, fresh extensions, no `Host` header and no
/// hop-by-hop headers.
pub fn outbound_request(
    request: Request<Body>,
    origin: &OriginConfig,
) -> Result<Request<Body>, ProxyError> {
    if origin.host.is_empty() {
        return Err(ProxyError::MissingOrigin);
    }

    let (parts, body) = request.into_parts();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    let uri = Uri::builder()
        .scheme(origin.scheme.as_str())
        .authority(origin.host.as_str())
        .path_and_query(path_and_query)
        .build()?;

    let mut headers = parts.headers;
    strip_hop_by_hop(&mut headers);
    headers.remove(header::HOST);
    headers.insert(header::TE, HeaderValue::from_static("trailers"));

    let mut outbound = Request::new(body);
    *outbound.method_mut() = parts.method;
    *outbound.uri_mut() = uri;
    *outbound.version_mut() = Version::HTTP_11;
    *outbound.headers_mut() = headers;
    Ok(outbound)
}

/// Remove hop-by-hop headers, including those named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }
}

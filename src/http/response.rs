//! Building the response written back to the client.
//!
//! # Responsibilities
//! - Stamp every response with the `X-Cache-Status` indicator, first
//! - Announce trailer names in a `Trailer` header before the body
//! - Emit trailers as the final body frame
//!
//! # Design Decisions
//! - Failure responses carry no body; details only go to the log
//! - Framing (`Content-Length` vs chunked) is left to the server stack

use axum::body::Body;
use axum::http::{header::CONTENT_LENGTH, header::TRAILER, HeaderName, HeaderValue, Response, StatusCode};
use futures_util::stream;
use http_body_util::StreamBody;
use hyper::body::Frame;
use std::convert::Infallible;

use crate::http::codec::StoredResponse;

/// Diagnostic header telling whether the response came from the cache.
pub const X_CACHE_STATUS: HeaderName = HeaderName::from_static("x-cache-status");

/// Outcome of the cache decision for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }

    fn header_value(&self) -> HeaderValue {
        HeaderValue::from_static(self.as_str())
    }
}

impl std::fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Turn a stored response into the response sent to the client.
pub fn into_client_response(stored: StoredResponse, cache: CacheStatus) -> Response<Body> {
    let StoredResponse {
        status,
        headers,
        trailer_names,
        trailers,
        body,
    } = stored;

    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;

    let out = response.headers_mut();
    out.reserve(headers.len() + 2);
    out.insert(X_CACHE_STATUS, cache.header_value());

    let mut current: Option<HeaderName> = None;
    for (name, value) in headers {
        // `None` repeats the previous name
        if let Some(name) = name {
            current = Some(name);
        }
        if let Some(name) = &current {
            out.append(name.clone(), value);
        }
    }

    let has_trailers = !trailer_names.is_empty() || !trailers.is_empty();
    if !has_trailers {
        *response.body_mut() = Body::from(body);
        return response;
    }

    let mut names = trailer_names;
    for name in trailers.keys() {
        if !names.contains(name) {
            names.push(name.clone());
        }
    }
    let declared = names.iter().map(|n| n.as_str()).collect::<Vec<_>>().join(", ");
    if let Ok(value) = HeaderValue::from_str(&declared) {
        out.insert(TRAILER, value);
    }
    out.remove(CONTENT_LENGTH);

    let mut frames: Vec<Result<Frame<bytes::Bytes>, Infallible>> = Vec::with_capacity(2);
    if !body.is_empty() {
        frames.push(Ok(Frame::data(body)));
    }
    if !trailers.is_empty() {
        frames.push(Ok(Frame::trailers(trailers)));
    }
    *response.body_mut() = Body::new(StreamBody::new(stream::iter(frames)));
    response
}

/// Empty-bodied response for a failed request.
pub fn failure_response(status: StatusCode, cache: CacheStatus) -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(X_CACHE_STATUS, cache.header_value());
    response
}

//! HTTP/1.1 response serialization for the cache.
//!
//! # Responsibilities
//! - Encode a [`StoredResponse`] into self-describing wire bytes
//! - Decode those bytes back, given the method of the request
//! - Carry trailers across: declared in a `Trailer` header, sent after the body
//!
//! # Design Decisions
//! - `Transfer-Encoding` and `Trailer` are framing owned by the codec and never
//!   appear in `StoredResponse::headers`
//! - Chunked framing only when trailers exist; otherwise the origin's
//!   `Content-Length` is kept, or the body runs to the end of the buffer
//! - HEAD responses and 1xx/204/304 statuses have no body on decode

use axum::body::Body;
use axum::http::{
    header::{CONTENT_LENGTH, TRAILER, TRANSFER_ENCODING},
    HeaderMap, HeaderName, HeaderValue, Method, Response, StatusCode,
};
use bytes::{BufMut, Bytes, BytesMut};
use http_body_util::BodyExt;
use thiserror::Error;

/// Maximum number of header (or trailer) lines accepted on decode.
const MAX_HEADERS: usize = 128;

/// Error produced when bytes are not a well-formed HTTP response.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("response is incomplete")]
    Incomplete,

    #[error("malformed response head: {0}")]
    Malformed(#[from] httparse::Error),

    #[error("invalid status code {0}")]
    InvalidStatus(u16),

    #[error("invalid header field")]
    InvalidHeader,

    #[error("invalid content-length")]
    InvalidContentLength,

    #[error("invalid chunked body")]
    InvalidChunk,

    #[error("body truncated: expected {expected} bytes, got {actual}")]
    TruncatedBody { expected: usize, actual: usize },
}

/// A complete HTTP response held in memory.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StoredResponse {
    pub status: StatusCode,
    /// End-to-end headers in received order.
    pub headers: HeaderMap,
    /// Trailer field names announced before the body.
    pub trailer_names: Vec<HeaderName>,
    /// Trailer fields sent after the body.
    pub trailers: HeaderMap,
    pub body: Bytes,
}

impl StoredResponse {
    /// Read an upstream response to the end, body and trailers included.
    pub async fn collect(response: Response<Body>) -> Result<Self, axum::Error> {
        let (parts, body) = response.into_parts();
        let collected = body.collect().await?;
        let trailers = collected.trailers().cloned().unwrap_or_default();
        let body = collected.to_bytes();

        let mut headers = parts.headers;
        let mut trailer_names = declared_trailers(&headers);
        headers.remove(TRAILER);
        headers.remove(TRANSFER_ENCODING);
        for name in trailers.keys() {
            if !trailer_names.contains(name) {
                trailer_names.push(name.clone());
            }
        }
        if !trailer_names.is_empty() {
            headers.remove(CONTENT_LENGTH);
        }

        Ok(Self {
            status: parts.status,
            headers,
            trailer_names,
            trailers,
            body,
        })
    }

    fn is_chunked(&self) -> bool {
        !self.trailer_names.is_empty() || !self.trailers.is_empty()
    }
}

/// Serialize a response into HTTP/1.1 wire format.
pub fn encode(response: &StoredResponse) -> Bytes {
    let chunked = response.is_chunked();
    let mut out = BytesMut::with_capacity(256 + response.body.len());

    out.put_slice(b"HTTP/1.1 ");
    out.put_slice(response.status.as_str().as_bytes());
    out.put_u8(b' ');
    out.put_slice(response.status.canonical_reason().unwrap_or("").as_bytes());
    out.put_slice(b"\r\n");

    for (name, value) in response.headers.iter() {
        if name == TRANSFER_ENCODING || name == TRAILER || (chunked && name == CONTENT_LENGTH) {
            continue;
        }
        put_field(&mut out, name, value);
    }

    if !chunked {
        out.put_slice(b"\r\n");
        out.put_slice(&response.body);
        return out.freeze();
    }

    let mut names: Vec<&HeaderName> = response.trailer_names.iter().collect();
    for name in response.trailers.keys() {
        if !names.contains(&name) {
            names.push(name);
        }
    }
    let declared = names.iter().map(|n| n.as_str()).collect::<Vec<_>>().join(", ");
    out.put_slice(b"trailer: ");
    out.put_slice(declared.as_bytes());
    out.put_slice(b"\r\ntransfer-encoding: chunked\r\n\r\n");

    if !response.body.is_empty() {
        out.put_slice(format!("{:x}\r\n", response.body.len()).as_bytes());
        out.put_slice(&response.body);
        out.put_slice(b"\r\n");
    }
    out.put_slice(b"0\r\n");
    for (name, value) in response.trailers.iter() {
        put_field(&mut out, name, value);
    }
    out.put_slice(b"\r\n");

    out.freeze()
}

/// Parse wire bytes produced by [`encode`] (or any HTTP/1.x response).
///
/// `method` is the method of the request the response answers; it decides
/// whether a body is expected at all.
pub fn decode(raw: &[u8], method: &Method) -> Result<StoredResponse, DecodeError> {
    let mut header_buf = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut head = httparse::Response::new(&mut header_buf);

    let head_len = match head.parse(raw)? {
        httparse::Status::Complete(len) => len,
        httparse::Status::Partial => return Err(DecodeError::Incomplete),
    };

    let code = head.code.ok_or(DecodeError::Incomplete)?;
    let status = StatusCode::from_u16(code).map_err(|_| DecodeError::InvalidStatus(code))?;

    let mut headers = HeaderMap::with_capacity(head.headers.len());
    let mut trailer_names = Vec::new();
    let mut chunked = false;
    let mut content_length = None;

    for field in head.headers.iter() {
        let (name, value) = to_field(field)?;

        if name == TRANSFER_ENCODING {
            chunked = is_chunked_coding(&value);
            continue;
        }
        if name == TRAILER {
            trailer_names.extend(parse_name_list(&value)?);
            continue;
        }
        if name == CONTENT_LENGTH {
            let len = value
                .to_str()
                .ok()
                .and_then(|v| v.trim().parse::<usize>().ok())
                .ok_or(DecodeError::InvalidContentLength)?;
            content_length = Some(len);
        }
        headers.append(name, value);
    }

    let rest = &raw[head_len..];
    let mut trailers = HeaderMap::new();

    let body = if !expects_body(method, status) {
        Bytes::new()
    } else if chunked {
        let (body, parsed_trailers) = decode_chunked(rest)?;
        trailers = parsed_trailers;
        body
    } else if let Some(expected) = content_length {
        if rest.len() < expected {
            return Err(DecodeError::TruncatedBody {
                expected,
                actual: rest.len(),
            });
        }
        Bytes::copy_from_slice(&rest[..expected])
    } else {
        Bytes::copy_from_slice(rest)
    };

    Ok(StoredResponse {
        status,
        headers,
        trailer_names,
        trailers,
        body,
    })
}

/// Trailer names listed in the `Trailer` header(s), in order, deduplicated.
fn declared_trailers(headers: &HeaderMap) -> Vec<HeaderName> {
    let mut names = Vec::new();
    for value in headers.get_all(TRAILER) {
        if let Ok(list) = parse_name_list(value) {
            for name in list {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
    }
    names
}

fn parse_name_list(value: &HeaderValue) -> Result<Vec<HeaderName>, DecodeError> {
    let text = value.to_str().map_err(|_| DecodeError::InvalidHeader)?;
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| HeaderName::from_bytes(s.as_bytes()).map_err(|_| DecodeError::InvalidHeader))
        .collect()
}

fn is_chunked_coding(value: &HeaderValue) -> bool {
    value
        .to_str()
        .ok()
        .and_then(|v| v.rsplit(',').next())
        .map(|last| last.trim().eq_ignore_ascii_case("chunked"))
        .unwrap_or(false)
}

fn expects_body(method: &Method, status: StatusCode) -> bool {
    !(method == Method::HEAD
        || status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED)
}

fn decode_chunked(mut rest: &[u8]) -> Result<(Bytes, HeaderMap), DecodeError> {
    let mut body = BytesMut::new();

    loop {
        let (consumed, size) = match httparse::parse_chunk_size(rest) {
            Ok(httparse::Status::Complete(parsed)) => parsed,
            Ok(httparse::Status::Partial) => return Err(DecodeError::Incomplete),
            Err(_) => return Err(DecodeError::InvalidChunk),
        };
        rest = &rest[consumed..];
        if size == 0 {
            break;
        }

        let size = usize::try_from(size).map_err(|_| DecodeError::InvalidChunk)?;
        let framed = size.checked_add(2).ok_or(DecodeError::InvalidChunk)?;
        if rest.len() < framed {
            return Err(DecodeError::Incomplete);
        }
        body.put_slice(&rest[..size]);
        if &rest[size..size + 2] != b"\r\n" {
            return Err(DecodeError::InvalidChunk);
        }
        rest = &rest[size + 2..];
    }

    let mut trailer_buf = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let fields = match httparse::parse_headers(rest, &mut trailer_buf)? {
        httparse::Status::Complete((_, fields)) => fields,
        httparse::Status::Partial => return Err(DecodeError::Incomplete),
    };

    let mut trailers = HeaderMap::with_capacity(fields.len());
    for field in fields {
        let (name, value) = to_field(field)?;
        trailers.append(name, value);
    }

    Ok((body.freeze(), trailers))
}

fn to_field(field: &httparse::Header<'_>) -> Result<(HeaderName, HeaderValue), DecodeError> {
    let name = HeaderName::from_bytes(field.name.as_bytes()).map_err(|_| DecodeError::InvalidHeader)?;
    let value = HeaderValue::from_bytes(field.value).map_err(|_| DecodeError::InvalidHeader)?;
    Ok((name, value))
}

fn put_field(out: &mut BytesMut, name: &HeaderName, value: &HeaderValue) {
    out.put_slice(name.as_str().as_bytes());
    out.put_slice(b": ");
    out.put_slice(value.as_bytes());
    out.put_slice(b"\r\n");
}

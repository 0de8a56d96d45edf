//! Cacheability decision based on the `Expires` response header.

use axum::http::{header::EXPIRES, HeaderMap};
use std::time::SystemTime;

/// Outcome of reading the `Expires` header of an upstream response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expiry {
    /// No `Expires` header.
    Missing,
    /// Header present but not an HTTP-date.
    Malformed(String),
    /// Valid header; the response may be cached until this instant.
    At(SystemTime),
}

impl Expiry {
    /// Read the first `Expires` value of `headers`.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let Some(value) = headers.get(EXPIRES) else {
            return Expiry::Missing;
        };

        let Ok(text) = value.to_str() else {
            return Expiry::Malformed(String::from_utf8_lossy(value.as_bytes()).into_owned());
        };

        match httpdate::parse_http_date(text.trim()) {
            Ok(at) => Expiry::At(at),
            Err(_) => Expiry::Malformed(text.to_string()),
        }
    }

    /// Deadline to store the response with, if it is cacheable at all.
    pub fn deadline(&self) -> Option<SystemTime> {
        match self {
            Expiry::At(at) => Some(*at),
            Expiry::Missing | Expiry::Malformed(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use std::time::Duration;

    #[test]
    fn test_missing_header() {
        assert_eq!(Expiry::from_headers(&HeaderMap::new()), Expiry::Missing);
        assert_eq!(Expiry::Missing.deadline(), None);
    }

    #[test]
    fn test_valid_http_date() {
        let mut headers = HeaderMap::new();
        headers.insert(EXPIRES, HeaderValue::from_static("Sun, 06 Nov 1994 08:49:37 GMT"));

        let expected = SystemTime::UNIX_EPOCH + Duration::from_secs(784_111_777);
        assert_eq!(Expiry::from_headers(&headers), Expiry::At(expected));
        assert_eq!(Expiry::from_headers(&headers).deadline(), Some(expected));
    }

    #[test]
    fn test_malformed_is_not_cacheable() {
        let mut headers = HeaderMap::new();
        headers.insert(EXPIRES, HeaderValue::from_static("tomorrow-ish"));

        let expiry = Expiry::from_headers(&headers);
        assert_eq!(expiry, Expiry::Malformed("tomorrow-ish".to_string()));
        assert_eq!(expiry.deadline(), None);
    }

    #[test]
    fn test_first_value_wins() {
        let mut headers = HeaderMap::new();
        headers.append(EXPIRES, HeaderValue::from_static("0"));
        headers.append(EXPIRES, HeaderValue::from_static("Sun, 06 Nov 1994 08:49:37 GMT"));

        assert!(matches!(Expiry::from_headers(&headers), Expiry::Malformed(_)));
    }
}

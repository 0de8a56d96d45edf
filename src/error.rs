//! Per-request error taxonomy.
//!
//! Every variant is terminal for the request that produced it. Nothing is
//! retried, and no detail from these errors is written to the client; the
//! handler logs the error and answers with [`ProxyError::status_code`] and an
//! empty body.

use axum::http::StatusCode;
use thiserror::Error;

use crate::http::codec::DecodeError;

/// Failure while serving a single proxied request.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The origin host is not configured.
    #[error("origin host is not configured")]
    MissingOrigin,

    /// The configured origin cannot be turned into a request URI.
    #[error("invalid origin: {0}")]
    InvalidOrigin(#[from] axum::http::Error),

    /// The round trip to the origin failed (refused, reset, DNS, ...).
    #[error("upstream request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),

    /// The origin answered but its body could not be read to the end.
    #[error("failed to read upstream body: {0}")]
    UpstreamBody(#[source] axum::Error),

    /// Response bytes were not a well-formed HTTP response.
    #[error("malformed response: {0}")]
    Decode(#[from] DecodeError),
}

impl ProxyError {
    /// Status code sent to the client for this failure.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::MissingOrigin | ProxyError::InvalidOrigin(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ProxyError::Upstream(_) | ProxyError::UpstreamBody(_) | ProxyError::Decode(_) => {
                StatusCode::BAD_GATEWAY
            }
        }
    }

    /// Returns true when the failure is a configuration fault rather than a
    /// transient upstream condition.
    pub fn is_config(&self) -> bool {
        matches!(self, ProxyError::MissingOrigin | ProxyError::InvalidOrigin(_))
    }
}

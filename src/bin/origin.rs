//! Demo origin server for trying the proxy by hand.
//!
//! Answers every path. `?s=<seconds>` makes the response cacheable for
//! that many seconds via `Expires`.

use axum::{
    extract::Query,
    http::{header, HeaderMap, HeaderValue, Uri},
    routing::any,
    Router,
};
use serde::Deserialize;
use std::time::{Duration, SystemTime};
use tokio::net::TcpListener;

const ORIGIN_ADDRESS: &str = "127.0.0.1:8081";

#[derive(Debug, Deserialize)]
struct Freshness {
    s: Option<String>,
}

async fn respond(uri: Uri, Query(freshness): Query<Freshness>) -> (HeaderMap, String) {
    let mut headers = HeaderMap::new();
    headers.insert("x-custom-header", HeaderValue::from_static("Origin"));

    let ttl = freshness.s.as_deref().and_then(|s| s.parse::<u64>().ok());
    if let Some(seconds) = ttl {
        let expires = SystemTime::now() + Duration::from_secs(seconds);
        if let Ok(value) = HeaderValue::from_str(&httpdate::fmt_http_date(expires)) {
            headers.insert(header::EXPIRES, value);
        }
    }

    tracing::info!(path = %uri.path(), ttl_secs = ?ttl, "Origin request");
    (headers, format!("Response from origin for path '{}'\n", uri.path()))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "origin=info".into()),
        )
        .init();

    let app = Router::new()
        .route("/", any(respond))
        .route("/{*path}", any(respond));

    let listener = TcpListener::bind(ORIGIN_ADDRESS).await?;
    tracing::info!(address = %ORIGIN_ADDRESS, "Origin server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

//! Single-origin HTTP caching reverse proxy.

pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;

pub use cache::ResponseCache;
pub use config::ProxyConfig;
pub use error::ProxyError;
pub use http::{HttpServer, ProxyHandler};
pub use lifecycle::Shutdown;

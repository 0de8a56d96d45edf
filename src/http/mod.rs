//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing)
//!     → handler.rs (cache decision)
//!         HIT  → codec.rs (decode stored bytes)
//!         MISS → forwarder.rs (origin round trip)
//!              → codec.rs (encode, decode)
//!     → response.rs (X-Cache-Status, trailers)
//!     → Send to client
//! ```

pub mod codec;
pub mod forwarder;
pub mod handler;
pub mod response;
pub mod server;

pub use codec::{DecodeError, StoredResponse};
pub use forwarder::Forwarder;
pub use handler::ProxyHandler;
pub use response::{CacheStatus, X_CACHE_STATUS};
pub use server::HttpServer;

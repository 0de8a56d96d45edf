//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log output (stdout)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Structured fields on every event (method, path, cache, status)
//! - Request ID flows from the HTTP layer into the logs
//! - Recording metrics without an installed exporter is a no-op

pub mod logging;
pub mod metrics;

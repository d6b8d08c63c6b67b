//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through the `TraceLayer` span
//! - Metrics are cheap (atomic increments)
//! - Credentials are never logged

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
pub use metrics::init_metrics;

//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Pool and connection tasks produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters and gauges via the metrics facade)
//! ```
//!
//! # Design Decisions
//! - Structured fields: route, connection_id, stream_id, request_id
//! - Metrics are cheap (no recorder installed means no-op)

pub mod logging;
pub mod metrics;

pub use logging::init_logging;

//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Gateway outcomes:
//!     → collector.rs (counters + latency ring, served as JSON on /metrics)
//!     → metrics.rs (Prometheus counters, gauges, histograms; optional)
//!     → logging.rs (structured log events)
//! ```
//!
//! # Design Decisions
//! - The JSON collector is always on; Prometheus export is opt-in
//! - Request ID flows through every request span
//! - Recording is cheap (one short lock or atomic increments)

pub mod collector;
pub mod logging;
pub mod metrics;

pub use collector::{MetricsCollector, MetricsSnapshot};

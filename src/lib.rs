//! Execution gateway library.
//!
//! Admission control (rate limit, bounded FIFO queue, circuit breaker) in
//! front of a slow, failure-prone downstream, served over HTTP.

pub mod admission;
pub mod config;
pub mod gateway;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::GatewayConfig;
pub use gateway::Gateway;
pub use http::HttpServer;
pub use lifecycle::Shutdown;

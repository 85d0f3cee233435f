//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Job admitted by the gateway:
//!     → circuit_breaker.rs (fail fast while the downstream is presumed down)
//!     → timeouts.rs (enforce execution deadline)
//!     → On completion: circuit_breaker.rs (track failures, open at threshold)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every downstream call has a deadline
//! - No retries on the caller's behalf; rejections are terminal
//! - Circuit breaker prevents cascading failures

pub mod circuit_breaker;
pub mod timeouts;

pub use circuit_breaker::{Admission, CircuitBreaker, CircuitState, Permit};

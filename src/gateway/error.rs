//! Outcome vocabulary of the gateway.
//!
//! Every request ends in exactly one [`Classification`]. Rejections carry the
//! data needed to build the response (retry hints, messages); execution
//! errors describe what went wrong downstream and whether it should count
//! against the circuit breaker.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::admission::RateLimitInfo;

/// The `classification` field of every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Classification {
    Success,
    ValidationError,
    RateLimited,
    Busy,
    BusyQueue,
    CircuitOpen,
    UpstreamError,
    /// The caller went away before the request finished. Metrics only.
    Cancelled,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Success => "success",
            Classification::ValidationError => "validation_error",
            Classification::RateLimited => "rate_limited",
            Classification::Busy => "busy",
            Classification::BusyQueue => "busy_queue",
            Classification::CircuitOpen => "circuit_open",
            Classification::UpstreamError => "upstream_error",
            Classification::Cancelled => "cancelled",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Classification::Success)
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a request did not complete successfully.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("{0}")]
    Validation(String),

    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("circuit open, downstream presumed unhealthy")]
    CircuitOpen { retry_after: Duration },

    #[error("rate limit of {} requests per window exceeded", .0.limit)]
    RateLimited(RateLimitInfo),

    #[error("all workers busy, queue wait timed out")]
    Busy,

    #[error("all workers busy and wait queue is full")]
    BusyQueue,

    #[error("execution failed: {0}")]
    Upstream(ExecutionError),
}

impl Rejection {
    pub fn classification(&self) -> Classification {
        match self {
            Rejection::Validation(_) | Rejection::PayloadTooLarge { .. } => {
                Classification::ValidationError
            }
            Rejection::CircuitOpen { .. } => Classification::CircuitOpen,
            Rejection::RateLimited(_) => Classification::RateLimited,
            Rejection::Busy => Classification::Busy,
            Rejection::BusyQueue => Classification::BusyQueue,
            Rejection::Upstream(_) => Classification::UpstreamError,
        }
    }
}

/// Failure of the unit of work itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("downstream did not answer within {0:?}")]
    Timeout(Duration),

    #[error("downstream rejected the request with status {status}: {message}")]
    Client { status: u16, message: String },

    #[error("downstream failed with status {status}: {message}")]
    Server { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("executor panicked: {0}")]
    Panicked(String),
}

impl ExecutionError {
    /// Whether this failure says something about downstream health.
    ///
    /// A 4xx from the downstream is the job's fault, not the downstream's,
    /// so it does not count toward opening the circuit.
    pub fn trips_breaker(&self) -> bool {
        !matches!(self, ExecutionError::Client { .. })
    }
}

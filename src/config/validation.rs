//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (durations > 0, capacities >= 1)
//! - Validate that addresses parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::GatewayConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: must be at least {min}")]
    TooSmall { field: &'static str, min: u64 },

    #[error("{field}: `{value}` is not a valid socket address")]
    BadAddress { field: &'static str, value: String },
}

/// Check a parsed configuration for semantic errors.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let mut at_least = |field: &'static str, value: u64, min: u64| {
        if value < min {
            errors.push(ValidationError::TooSmall { field, min });
        }
    };

    at_least(
        "concurrency.max_concurrency",
        config.concurrency.max_concurrency as u64,
        1,
    );
    at_least(
        "concurrency.queue_wait_timeout_ms",
        config.concurrency.queue_wait_timeout_ms,
        1,
    );
    at_least("rate_limit.window_ms", config.rate_limit.window_ms, 1);
    at_least(
        "circuit_breaker.failure_threshold",
        u64::from(config.circuit_breaker.failure_threshold),
        1,
    );
    at_least("circuit_breaker.window_ms", config.circuit_breaker.window_ms, 1);
    at_least(
        "circuit_breaker.cooldown_ms",
        config.circuit_breaker.cooldown_ms,
        1,
    );
    at_least(
        "metrics.latency_samples",
        config.metrics.latency_samples as u64,
        1,
    );
    at_least("limits.max_body_bytes", config.limits.max_body_bytes as u64, 1);
    at_least("execution.timeout_ms", config.execution.timeout_ms, 1);

    check_address(
        &mut errors,
        "listener.bind_address",
        &config.listener.bind_address,
    );
    if config.observability.prometheus_enabled {
        check_address(
            &mut errors,
            "observability.prometheus_address",
            &config.observability.prometheus_address,
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BadAddress {
            field,
            value: value.to_string(),
        });
    }
}

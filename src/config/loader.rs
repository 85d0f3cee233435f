//! Configuration loading from disk and the environment.

use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {var}: `{value}`")]
    Env { var: &'static str, value: String },

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load configuration: optional TOML file, then `GATEWAY_*` overrides, then validation.
pub fn load_config(path: Option<&Path>) -> Result<GatewayConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => GatewayConfig::default(),
    };

    apply_env_overrides(&mut config, |var| std::env::var(var).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply `GATEWAY_*` overrides using `lookup` to read variables.
pub fn apply_env_overrides<F>(config: &mut GatewayConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(port) = parsed::<u16, _>(&lookup, "GATEWAY_PORT")? {
        let mut addr: SocketAddr =
            config
                .listener
                .bind_address
                .parse()
                .map_err(|_| ConfigError::Env {
                    var: "GATEWAY_PORT",
                    value: port.to_string(),
                })?;
        addr.set_port(port);
        config.listener.bind_address = addr.to_string();
    }

    override_with(&lookup, "GATEWAY_MAX_CONCURRENCY", &mut config.concurrency.max_concurrency)?;
    override_with(&lookup, "GATEWAY_QUEUE_MAX", &mut config.concurrency.queue_max)?;
    override_with(
        &lookup,
        "GATEWAY_QUEUE_TIMEOUT_MS",
        &mut config.concurrency.queue_wait_timeout_ms,
    )?;
    override_with(&lookup, "GATEWAY_RATE_LIMIT", &mut config.rate_limit.limit)?;
    override_with(&lookup, "GATEWAY_RATE_WINDOW_MS", &mut config.rate_limit.window_ms)?;
    override_with(
        &lookup,
        "GATEWAY_CB_THRESHOLD",
        &mut config.circuit_breaker.failure_threshold,
    )?;
    override_with(&lookup, "GATEWAY_CB_WINDOW_MS", &mut config.circuit_breaker.window_ms)?;
    override_with(
        &lookup,
        "GATEWAY_CB_COOLDOWN_MS",
        &mut config.circuit_breaker.cooldown_ms,
    )?;
    override_with(
        &lookup,
        "GATEWAY_LATENCY_SAMPLES",
        &mut config.metrics.latency_samples,
    )?;
    override_with(&lookup, "GATEWAY_MAX_BODY_BYTES", &mut config.limits.max_body_bytes)?;
    override_with(&lookup, "GATEWAY_STUB_DELAY_MS", &mut config.execution.stub_delay_ms)?;
    override_with(
        &lookup,
        "GATEWAY_EXECUTION_TIMEOUT_MS",
        &mut config.execution.timeout_ms,
    )?;

    if let Some(level) = lookup("GATEWAY_LOG_LEVEL") {
        config.observability.log_level = level;
    }

    Ok(())
}

fn override_with<T, F>(lookup: &F, var: &'static str, slot: &mut T) -> Result<(), ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = parsed(lookup, var)? {
        *slot = value;
    }
    Ok(())
}

fn parsed<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Env { var, value: raw }),
    }
}

//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → loader.rs (GATEWAY_* environment overrides)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → handed to Gateway and HttpServer at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; admission state lives for the process
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    CircuitBreakerConfig, ConcurrencyConfig, ExecutionConfig, GatewayConfig, LimitsConfig,
    ListenerConfig, LogFormat, MetricsConfig, ObservabilityConfig, RateLimitConfig,
};

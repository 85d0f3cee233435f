//! Execution Gateway
//!
//! Fronts the link-update workload and protects the downstream ad platform
//! from overload.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌──────────────────────────────────────────────────────┐
//!                         │                 EXECUTION GATEWAY                    │
//!                         │                                                      │
//!   POST /update          │  ┌────────┐   ┌─────────┐   ┌────────┐   ┌────────┐  │
//!   ──────────────────────┼─▶│validate│──▶│ circuit │──▶│  rate  │──▶│  gate  │  │
//!                         │  │  job   │   │ breaker │   │ limit  │   │ +queue │  │
//!                         │  └────────┘   └─────────┘   └────────┘   └───┬────┘  │
//!                         │                                              │       │
//!                         │                                              ▼       │
//!   JSON response         │  ┌──────────┐   ┌───────────────┐      ┌──────────┐  │
//!   ◀─────────────────────┼──│ response │◀──│ record outcome│◀─────│ executor │──┼──▶ Downstream
//!                         │  └──────────┘   └───────────────┘      └──────────┘  │
//!                         │                                                      │
//!                         │   GET /health   GET /metrics   (Prometheus opt-in)   │
//!                         └──────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use execution_gateway::config::load_config;
use execution_gateway::lifecycle::{signals, Shutdown};
use execution_gateway::observability::{logging, metrics};
use execution_gateway::HttpServer;

#[derive(Parser)]
#[command(name = "execution-gateway")]
#[command(about = "Admission-controlled execution gateway", long_about = None)]
struct Args {
    /// Path to a TOML config file. Defaults apply when omitted.
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    logging::init_logging(&config.observability);
    tracing::info!("execution-gateway v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_concurrency = config.concurrency.max_concurrency,
        queue_max = config.concurrency.queue_max,
        queue_wait_timeout_ms = config.concurrency.queue_wait_timeout_ms,
        rate_limit = config.rate_limit.limit,
        rate_window_ms = config.rate_limit.window_ms,
        failure_threshold = config.circuit_breaker.failure_threshold,
        cooldown_ms = config.circuit_breaker.cooldown_ms,
        "Configuration loaded"
    );

    if config.observability.prometheus_enabled {
        let addr: SocketAddr = config.observability.prometheus_address.parse()?;
        if let Err(e) = metrics::init_metrics(addr) {
            tracing::error!(error = %e, "Failed to start Prometheus exporter");
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    let server = HttpServer::new(config);
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use execution_gateway::gateway::{ExecutionError, Executor, Job};
use execution_gateway::{GatewayConfig, HttpServer, Shutdown};
use tokio::net::TcpListener;

/// A running gateway bound to an ephemeral loopback port.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub client: reqwest::Client,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn update(&self, link: &str) -> reqwest::Response {
        self.client
            .post(self.url("/update"))
            .json(&serde_json::json!({ "link": link }))
            .send()
            .await
            .expect("gateway unreachable")
    }

    pub async fn get_json(&self, path: &str) -> (u16, serde_json::Value) {
        let res = self
            .client
            .get(self.url(path))
            .send()
            .await
            .expect("gateway unreachable");
        let status = res.status().as_u16();
        (status, res.json().await.expect("JSON body"))
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Config with a fast stub and limits loose enough not to interfere.
pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.rate_limit.limit = 10_000;
    config.execution.stub_delay_ms = 10;
    config
}

pub async fn start(config: GatewayConfig) -> TestGateway {
    start_server(HttpServer::new(config)).await
}

pub async fn start_with(config: GatewayConfig, executor: Arc<dyn Executor>) -> TestGateway {
    start_server(HttpServer::with_executor(config, executor)).await
}

async fn start_server(server: HttpServer) -> TestGateway {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    let client = reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap();

    TestGateway {
        addr,
        shutdown,
        client,
    }
}

/// Executor that sleeps and tracks how many calls overlap.
pub struct CountingExecutor {
    delay: Duration,
    current: AtomicUsize,
    pub peak: AtomicUsize,
    pub calls: AtomicUsize,
}

impl CountingExecutor {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Executor for CountingExecutor {
    async fn execute(&self, _job: &Job) -> Result<(), ExecutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Executor whose downstream always answers 503.
pub struct FailingExecutor;

#[async_trait]
impl Executor for FailingExecutor {
    async fn execute(&self, _job: &Job) -> Result<(), ExecutionError> {
        Err(ExecutionError::Server {
            status: 503,
            message: "downstream unavailable".into(),
        })
    }
}

/// Executor that fails with a transport error a fixed number of times, then recovers.
pub struct FlakyExecutor {
    failures_left: AtomicUsize,
}

impl FlakyExecutor {
    pub fn new(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            failures_left: AtomicUsize::new(failures),
        })
    }
}

#[async_trait]
impl Executor for FlakyExecutor {
    async fn execute(&self, _job: &Job) -> Result<(), ExecutionError> {
        let left = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match left {
            Ok(_) => Err(ExecutionError::Transport("connection reset".into())),
            Err(_) => Ok(()),
        }
    }
}

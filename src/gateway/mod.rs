//! Gateway core: admission control wrapped around a single `update` operation.
//!
//! # Data Flow
//! ```text
//! POST /update body
//!     → job.rs (parse + validate)              → validation_error
//!     → CircuitBreaker::admit                  → circuit_open
//!     → RateLimiter::try_acquire               → rate_limited
//!     → ConcurrencyGate::acquire (maybe wait)  → busy_queue / busy
//!     → Executor::execute under deadline       → upstream_error
//!     → release slot, record outcome, record metrics
//! ```
//!
//! # Design Decisions
//! - One `Gateway` owns all admission state; built once, shared via `Arc`
//! - Every request is recorded in metrics exactly once, whatever its outcome,
//!   including a caller that disconnects mid-request (`cancelled`)
//! - Execution is the only error/panic boundary; it becomes `upstream_error`

pub mod error;
pub mod executor;
pub mod job;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::time::Instant;

use crate::admission::{Acquire, ConcurrencyGate, RateDecision, RateLimiter};
use crate::config::GatewayConfig;
use crate::observability::{metrics, MetricsCollector, MetricsSnapshot};
use crate::resilience::{timeouts, CircuitBreaker, CircuitState};

pub use error::{Classification, ExecutionError, Rejection};
pub use executor::{Executor, StubExecutor};
pub use job::{Job, UpdateRequest};

/// A successfully executed job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completed {
    pub job: Job,
    pub latency: Duration,
}

/// Read-only view used by `GET /health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthView {
    pub in_flight: usize,
    pub queue_length: usize,
    pub circuit: CircuitState,
}

/// Admission-controlled front for the downstream executor.
pub struct Gateway {
    breaker: CircuitBreaker,
    limiter: RateLimiter,
    gate: ConcurrencyGate,
    metrics: MetricsCollector,
    executor: Arc<dyn Executor>,
    queue_wait: Duration,
    execution_timeout: Duration,
}

impl Gateway {
    pub fn new(config: &GatewayConfig, executor: Arc<dyn Executor>) -> Self {
        Self {
            breaker: CircuitBreaker::from_config(&config.circuit_breaker),
            limiter: RateLimiter::from_config(&config.rate_limit),
            gate: ConcurrencyGate::from_config(&config.concurrency),
            metrics: MetricsCollector::new(config.metrics.latency_samples),
            executor,
            queue_wait: config.concurrency.queue_wait_timeout(),
            execution_timeout: config.execution.timeout(),
        }
    }

    /// Gateway backed by the stub executor.
    pub fn with_stub(config: &GatewayConfig) -> Self {
        Self::new(config, Arc::new(StubExecutor::new(config.execution.stub_delay())))
    }

    /// Parse, validate and process a raw `POST /update` body.
    pub async fn submit(&self, body: &[u8]) -> Result<Completed, Rejection> {
        let started = Instant::now();
        match UpdateRequest::from_json(body).and_then(UpdateRequest::validate) {
            Ok(job) => self.process(job, started).await,
            Err(rejection) => {
                self.record(rejection.classification(), started);
                Err(rejection)
            }
        }
    }

    /// Run an already validated job through admission control and execution.
    pub async fn update(&self, job: Job) -> Result<Completed, Rejection> {
        self.process(job, Instant::now()).await
    }

    /// Record a request that was rejected before reaching the gateway.
    pub fn record_rejection(&self, rejection: &Rejection, started: Instant) {
        self.record(rejection.classification(), started);
    }

    async fn process(&self, job: Job, started: Instant) -> Result<Completed, Rejection> {
        let pending = PendingRecord {
            gateway: self,
            started,
            recorded: false,
        };
        let result = self.admit_and_execute(job, started).await;
        pending.finish(match &result {
            Ok(_) => Classification::Success,
            Err(rejection) => rejection.classification(),
        });
        result
    }

    async fn admit_and_execute(&self, job: Job, started: Instant) -> Result<Completed, Rejection> {
        // Any early return drops the permit, which gives back an unsettled trial.
        let permit = self
            .breaker
            .admit()
            .map_err(|retry_after| Rejection::CircuitOpen { retry_after })?;

        if let RateDecision::Rejected(info) = self.limiter.try_acquire() {
            return Err(Rejection::RateLimited(info));
        }

        let slot = match self.gate.acquire(self.queue_wait).await {
            Acquire::Acquired(slot) => slot,
            Acquire::QueueFull => return Err(Rejection::BusyQueue),
            Acquire::TimedOut => return Err(Rejection::Busy),
        };

        metrics::record_admission(self.gate.in_flight(), self.gate.queue_len());
        let outcome = self.execute(&job).await;
        drop(slot);

        match outcome {
            Ok(()) => {
                permit.record(true);
                Ok(Completed {
                    job,
                    latency: started.elapsed(),
                })
            }
            Err(error) => {
                tracing::warn!(
                    link = %job.link,
                    error = %error,
                    probe = permit.is_probe(),
                    "Execution failed"
                );
                if error.trips_breaker() {
                    permit.record(false);
                }
                Err(Rejection::Upstream(error))
            }
        }
    }

    async fn execute(&self, job: &Job) -> Result<(), ExecutionError> {
        let call = timeouts::with_deadline(self.execution_timeout, self.executor.execute(job));
        match AssertUnwindSafe(call).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(link = %job.link, panic = %message, "Executor panicked");
                Err(ExecutionError::Panicked(message))
            }
        }
    }

    fn record(&self, classification: Classification, started: Instant) {
        let latency = started.elapsed();
        self.metrics.record(classification, latency);
        metrics::record_update(classification, latency);
        metrics::record_admission(self.gate.in_flight(), self.gate.queue_len());
        metrics::record_circuit_state(self.breaker.state());
    }

    pub fn health(&self) -> HealthView {
        HealthView {
            in_flight: self.gate.in_flight(),
            queue_length: self.gate.queue_len(),
            circuit: self.breaker.state(),
        }
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        let mut snapshot = self.metrics.snapshot();
        snapshot.in_flight = self.gate.in_flight();
        snapshot.queue_length = self.gate.queue_len();
        snapshot
    }

    /// Limit reported in `x-ratelimit-limit`.
    pub fn rate_limit(&self) -> u32 {
        self.limiter.limit()
    }
}

/// Records a request exactly once, as `cancelled` if its future is dropped
/// before an outcome is known.
struct PendingRecord<'a> {
    gateway: &'a Gateway,
    started: Instant,
    recorded: bool,
}

impl PendingRecord<'_> {
    fn finish(mut self, classification: Classification) {
        self.recorded = true;
        self.gateway.record(classification, self.started);
    }
}

impl Drop for PendingRecord<'_> {
    fn drop(&mut self) {
        if !self.recorded {
            tracing::debug!("Request dropped before completion");
            self.gateway.record(Classification::Cancelled, self.started);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use url::Url;

    struct Scripted {
        calls: AtomicUsize,
        fail_first: usize,
        error: ExecutionError,
    }

    #[async_trait]
    impl Executor for Scripted {
        async fn execute(&self, _job: &Job) -> Result<(), ExecutionError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                Err(self.error.clone())
            } else {
                Ok(())
            }
        }
    }

    /// Plays back one `(delay, result)` step per call, repeating the last.
    struct Steps {
        calls: AtomicUsize,
        steps: Vec<(Duration, Result<(), ExecutionError>)>,
    }

    #[async_trait]
    impl Executor for Steps {
        async fn execute(&self, _job: &Job) -> Result<(), ExecutionError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let (delay, result) = self.steps[n.min(self.steps.len() - 1)].clone();
            tokio::time::sleep(delay).await;
            result
        }
    }

    struct Panicking;

    #[async_trait]
    impl Executor for Panicking {
        async fn execute(&self, _job: &Job) -> Result<(), ExecutionError> {
            panic!("downstream exploded");
        }
    }

    fn job() -> Job {
        Job::new(Url::parse("https://x").unwrap())
    }

    fn config() -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.rate_limit.limit = 1_000;
        config.circuit_breaker.failure_threshold = 2;
        config.circuit_breaker.cooldown_ms = 1_000;
        config
    }

    fn scripted(fail_first: usize, error: ExecutionError) -> Arc<dyn Executor> {
        Arc::new(Scripted {
            calls: AtomicUsize::new(0),
            fail_first,
            error,
        })
    }

    fn steps(steps: Vec<(Duration, Result<(), ExecutionError>)>) -> Arc<dyn Executor> {
        Arc::new(Steps {
            calls: AtomicUsize::new(0),
            steps,
        })
    }

    fn reset() -> ExecutionError {
        ExecutionError::Transport("connection reset".into())
    }

    const COOLDOWN: Duration = Duration::from_millis(1_000);

    fn spawn_update(
        gateway: &Arc<Gateway>,
    ) -> tokio::task::JoinHandle<Result<Completed, Rejection>> {
        let gateway = gateway.clone();
        tokio::spawn(async move { gateway.update(job()).await })
    }

    async fn wait_for_in_flight(gateway: &Gateway, in_flight: usize) {
        while gateway.health().in_flight != in_flight {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stubbed_update_succeeds_and_is_recorded() {
        let gateway = Gateway::with_stub(&config());
        let done = gateway.update(job()).await.unwrap();
        assert_eq!(done.job, job());

        let snapshot = gateway.metrics_snapshot();
        assert_eq!(snapshot.total, 1);
        assert_eq!(snapshot.success, 1);
        assert_eq!(snapshot.in_flight, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_body_is_recorded_without_admission() {
        let gateway = Gateway::with_stub(&config());
        let err = gateway.submit(br#"{"link":"not-a-url"}"#).await.unwrap_err();
        assert_eq!(err.classification(), Classification::ValidationError);

        let snapshot = gateway.metrics_snapshot();
        assert_eq!(snapshot.classifications["validation_error"], 1);
        assert_eq!(gateway.health().circuit, CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn server_errors_open_the_circuit() {
        let error = ExecutionError::Server {
            status: 503,
            message: "unavailable".into(),
        };
        let gateway = Gateway::new(&config(), scripted(usize::MAX, error));

        for _ in 0..2 {
            let err = gateway.update(job()).await.unwrap_err();
            assert_eq!(err.classification(), Classification::UpstreamError);
        }
        let err = gateway.update(job()).await.unwrap_err();
        assert_eq!(err.classification(), Classification::CircuitOpen);
        assert_eq!(gateway.health().circuit, CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn client_errors_leave_the_circuit_closed() {
        let error = ExecutionError::Client {
            status: 404,
            message: "no such ad".into(),
        };
        let gateway = Gateway::new(&config(), scripted(usize::MAX, error));

        for _ in 0..5 {
            let err = gateway.update(job()).await.unwrap_err();
            assert_eq!(err.classification(), Classification::UpstreamError);
        }
        assert_eq!(gateway.health().circuit, CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn trial_success_closes_circuit_after_cooldown() {
        let error = ExecutionError::Transport("connection reset".into());
        let gateway = Gateway::new(&config(), scripted(2, error));

        gateway.update(job()).await.unwrap_err();
        gateway.update(job()).await.unwrap_err();
        assert_eq!(gateway.health().circuit, CircuitState::Open);

        tokio::time::advance(Duration::from_millis(1_000)).await;
        assert!(gateway.update(job()).await.is_ok());
        assert_eq!(gateway.health().circuit, CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_probe_is_abandoned() {
        let mut config = config();
        config.rate_limit.limit = 2;
        let error = ExecutionError::Transport("reset".into());
        let gateway = Gateway::new(&config, scripted(2, error));

        gateway.update(job()).await.unwrap_err();
        gateway.update(job()).await.unwrap_err();
        tokio::time::advance(Duration::from_millis(1_000)).await;

        // The trial is admitted by the breaker but refused by the exhausted window.
        let err = gateway.update(job()).await.unwrap_err();
        assert_eq!(err.classification(), Classification::RateLimited);
        assert_eq!(gateway.health().circuit, CircuitState::HalfOpen);

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(gateway.update(job()).await.is_ok());
        assert_eq!(gateway.health().circuit, CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_executor_times_out_as_upstream_error() {
        let mut config = config();
        config.execution.stub_delay_ms = 5_000;
        config.execution.timeout_ms = 100;
        let gateway = Gateway::with_stub(&config);

        let err = gateway.update(job()).await.unwrap_err();
        assert!(matches!(err, Rejection::Upstream(ExecutionError::Timeout(_))));
        assert_eq!(gateway.health().in_flight, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn executor_panic_becomes_upstream_error() {
        let gateway = Gateway::new(&config(), Arc::new(Panicking));
        let err = gateway.update(job()).await.unwrap_err();
        match err {
            Rejection::Upstream(ExecutionError::Panicked(message)) => {
                assert!(message.contains("downstream exploded"));
            }
            other => panic!("unexpected rejection: {:?}", other),
        }
        assert_eq!(gateway.health().in_flight, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_trial_reopens_the_circuit() {
        let gateway = Gateway::new(&config(), scripted(usize::MAX, reset()));
        gateway.update(job()).await.unwrap_err();
        gateway.update(job()).await.unwrap_err();
        tokio::time::advance(COOLDOWN).await;

        let err = gateway.update(job()).await.unwrap_err();
        assert_eq!(err.classification(), Classification::UpstreamError);
        assert_eq!(gateway.health().circuit, CircuitState::Open);

        let err = gateway.update(job()).await.unwrap_err();
        assert!(matches!(err, Rejection::CircuitOpen { retry_after } if retry_after == COOLDOWN));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_trial_frees_the_circuit() {
        let gateway = Gateway::new(
            &config(),
            steps(vec![
                (Duration::ZERO, Err(reset())),
                (Duration::ZERO, Err(reset())),
                (Duration::from_secs(10), Ok(())),
            ]),
        );
        gateway.update(job()).await.unwrap_err();
        gateway.update(job()).await.unwrap_err();
        tokio::time::advance(COOLDOWN).await;

        let cancelled =
            tokio::time::timeout(Duration::from_millis(100), gateway.update(job())).await;
        assert!(cancelled.is_err());

        let health = gateway.health();
        assert_eq!(health.circuit, CircuitState::HalfOpen);
        assert_eq!(health.in_flight, 0);
        let snapshot = gateway.metrics_snapshot();
        assert_eq!(snapshot.total, 3);
        assert_eq!(snapshot.classifications["cancelled"], 1);

        tokio::time::advance(Duration::from_secs(3_600)).await;
        assert!(gateway.update(job()).await.is_ok());
        assert_eq!(gateway.health().circuit, CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn trial_cancelled_while_queued_is_given_back() {
        let mut config = config();
        config.concurrency.max_concurrency = 1;
        let gateway = Gateway::new(&config, scripted(2, reset()));
        gateway.update(job()).await.unwrap_err();
        gateway.update(job()).await.unwrap_err();
        tokio::time::advance(COOLDOWN).await;

        let held = match gateway.gate.acquire(Duration::ZERO).await {
            Acquire::Acquired(slot) => slot,
            other => panic!("expected a free slot, got {:?}", other),
        };
        let cancelled =
            tokio::time::timeout(Duration::from_millis(100), gateway.update(job())).await;
        assert!(cancelled.is_err());
        assert_eq!(gateway.health().queue_length, 0);
        assert_eq!(gateway.health().circuit, CircuitState::HalfOpen);

        drop(held);
        assert!(gateway.update(job()).await.is_ok());
        assert_eq!(gateway.health().circuit, CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn late_success_does_not_decide_the_trial() {
        let gateway = Arc::new(Gateway::new(
            &config(),
            steps(vec![
                (Duration::from_secs(5), Ok(())),
                (Duration::ZERO, Err(reset())),
                (Duration::ZERO, Err(reset())),
                (Duration::from_secs(10), Err(reset())),
            ]),
        ));

        // Admitted while closed, finishes after the trial has started.
        let slow = spawn_update(&gateway);
        wait_for_in_flight(&gateway, 1).await;

        gateway.update(job()).await.unwrap_err();
        gateway.update(job()).await.unwrap_err();
        assert_eq!(gateway.health().circuit, CircuitState::Open);

        tokio::time::advance(COOLDOWN).await;
        let trial = spawn_update(&gateway);
        wait_for_in_flight(&gateway, 2).await;
        assert_eq!(gateway.health().circuit, CircuitState::HalfOpen);

        let err = gateway.update(job()).await.unwrap_err();
        assert_eq!(err.classification(), Classification::CircuitOpen);

        assert!(slow.await.unwrap().is_ok());
        assert_eq!(gateway.health().circuit, CircuitState::HalfOpen);

        trial.await.unwrap().unwrap_err();
        assert_eq!(gateway.health().circuit, CircuitState::Open);
    }
}

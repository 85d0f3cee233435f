//! Circuit breaker for downstream protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: downstream assumed down, requests fail fast
//! - Half-Open: a single trial request tests whether it recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: failures >= threshold within the counting window
//! Open → Half-Open: first admission check after the cooldown
//! Half-Open → Closed: trial request succeeds
//! Half-Open → Open: trial request fails (cooldown restarts)
//! ```
//!
//! # Design Decisions
//! - One breaker for the whole gateway (single downstream)
//! - Fail fast in Open state (no waiting for timeout)
//! - Single probe in Half-Open (prevents hammering recovering downstream)
//! - Only the trial's own outcome moves Half-Open; late outcomes of requests
//!   admitted earlier are counted but never decide the state
//! - The trial is held by a [`Permit`]; dropping it unsettled frees the trial

use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;

/// Externally visible breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Answer to an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Let the request through. `probe` marks the single half-open trial.
    Admit { probe: bool },
    /// Circuit open; the cooldown ends after `retry_after`.
    Reject { retry_after: Duration },
}

#[derive(Debug, Clone, Copy)]
enum State {
    Closed,
    Open { until: Instant },
    HalfOpen { probe_in_flight: bool },
}

struct Inner {
    state: State,
    failures: u32,
    window_start: Instant,
}

/// Counts failures in a fixed window and trips open at a threshold.
pub struct CircuitBreaker {
    inner: Mutex<Inner>,
    threshold: u32,
    window: Duration,
    cooldown: Duration,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, window: Duration, cooldown: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: State::Closed,
                failures: 0,
                window_start: Instant::now(),
            }),
            threshold,
            window,
            cooldown,
        }
    }

    pub fn from_config(config: &CircuitBreakerConfig) -> Self {
        Self::new(config.failure_threshold, config.window(), config.cooldown())
    }

    /// Decide whether a request may proceed to the downstream.
    pub fn should_admit(&self) -> Admission {
        let now = Instant::now();
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");

        let state = inner.state;
        match state {
            State::Closed => Admission::Admit { probe: false },
            State::Open { until } if now >= until => {
                inner.state = State::HalfOpen { probe_in_flight: true };
                tracing::info!("Circuit half-open, admitting trial request");
                Admission::Admit { probe: true }
            }
            State::Open { until } => Admission::Reject {
                retry_after: until.saturating_duration_since(now),
            },
            State::HalfOpen { probe_in_flight: false } => {
                inner.state = State::HalfOpen { probe_in_flight: true };
                Admission::Admit { probe: true }
            }
            State::HalfOpen { probe_in_flight: true } => Admission::Reject {
                retry_after: Duration::ZERO,
            },
        }
    }

    /// Admission check that hands out a [`Permit`] to settle later.
    pub fn admit(&self) -> Result<Permit<'_>, Duration> {
        match self.should_admit() {
            Admission::Admit { probe } => Ok(Permit {
                breaker: self,
                probe,
                settled: false,
            }),
            Admission::Reject { retry_after } => Err(retry_after),
        }
    }

    /// Feed the result of an executed request back into the breaker.
    ///
    /// `probe` must be true only for the request admitted as the half-open
    /// trial; any other outcome can add failures but never moves Half-Open.
    pub fn record_outcome(&self, probe: bool, success: bool) {
        let now = Instant::now();
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");

        if now.duration_since(inner.window_start) >= self.window {
            inner.window_start = now;
            inner.failures = 0;
        }

        match (inner.state, probe, success) {
            (State::HalfOpen { .. }, true, true) => {
                inner.state = State::Closed;
                inner.failures = 0;
                inner.window_start = now;
                tracing::info!("Circuit closed after successful trial");
            }
            (State::HalfOpen { .. }, true, false) => {
                inner.state = State::Open {
                    until: now + self.cooldown,
                };
                inner.failures = 0;
                inner.window_start = now;
                tracing::warn!(
                    cooldown_ms = self.cooldown.as_millis() as u64,
                    "Trial request failed, circuit reopened"
                );
            }
            (State::Closed, _, false) => {
                inner.failures += 1;
                if inner.failures >= self.threshold {
                    inner.state = State::Open {
                        until: now + self.cooldown,
                    };
                    tracing::warn!(
                        failures = inner.failures,
                        threshold = self.threshold,
                        cooldown_ms = self.cooldown.as_millis() as u64,
                        "Circuit opened"
                    );
                }
            }
            // Late outcomes from requests admitted before the circuit opened.
            (State::Open { .. } | State::HalfOpen { .. }, _, false) => inner.failures += 1,
            (_, _, true) => {}
        }
    }

    /// Give back the half-open trial slot when the trial never ran.
    pub fn abandon_probe(&self) {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        if let State::HalfOpen { probe_in_flight: true } = inner.state {
            inner.state = State::HalfOpen { probe_in_flight: false };
            tracing::debug!("Trial request abandoned, next request may probe");
        }
    }

    /// Current state, without applying any pending transition.
    pub fn state(&self) -> CircuitState {
        let inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        match inner.state {
            State::Closed => CircuitState::Closed,
            State::Open { .. } => CircuitState::Open,
            State::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }

    /// Failures counted in the current window.
    pub fn failure_count(&self) -> u32 {
        self.inner
            .lock()
            .expect("circuit breaker mutex poisoned")
            .failures
    }
}

/// A request let through by the breaker.
///
/// Settle it with [`Permit::record`] once the downstream answered. An
/// unsettled trial permit (rejected later, not counted, or cancelled) gives
/// the trial back on drop so the circuit cannot stay half-open forever.
#[must_use = "dropping a trial permit abandons the trial"]
pub struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    settled: bool,
}

impl Permit<'_> {
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn record(mut self, success: bool) {
        self.settled = true;
        self.breaker.record_outcome(self.probe, success);
    }
}

impl fmt::Debug for Permit<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Permit")
            .field("probe", &self.probe)
            .field("settled", &self.settled)
            .finish()
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if self.probe && !self.settled {
            self.breaker.abandon_probe();
        }
    }
}

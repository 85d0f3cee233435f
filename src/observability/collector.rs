//! In-process request metrics served on `GET /metrics`.
//!
//! Counters are monotonic for the life of the process. Latency is kept as a
//! ring of the most recent samples, so the p95 is an estimate over recent
//! traffic rather than a global percentile.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;

use crate::gateway::Classification;

/// Point-in-time view of gateway metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub total: u64,
    pub success: u64,
    pub failure: u64,
    pub classifications: BTreeMap<String, u64>,
    /// Milliseconds.
    pub p95: u64,
    pub in_flight: usize,
    pub queue_length: usize,
}

struct Counters {
    total: u64,
    success: u64,
    failure: u64,
    classifications: BTreeMap<&'static str, u64>,
    latencies_ms: VecDeque<u64>,
}

pub struct MetricsCollector {
    counters: Mutex<Counters>,
    sample_capacity: usize,
}

impl MetricsCollector {
    pub fn new(sample_capacity: usize) -> Self {
        let sample_capacity = sample_capacity.max(1);
        Self {
            counters: Mutex::new(Counters {
                total: 0,
                success: 0,
                failure: 0,
                classifications: BTreeMap::new(),
                latencies_ms: VecDeque::with_capacity(sample_capacity),
            }),
            sample_capacity,
        }
    }

    pub fn record(&self, classification: Classification, latency: Duration) {
        let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        let mut counters = self.counters.lock().expect("metrics mutex poisoned");

        counters.total += 1;
        if classification.is_success() {
            counters.success += 1;
        } else {
            counters.failure += 1;
        }
        *counters
            .classifications
            .entry(classification.as_str())
            .or_insert(0) += 1;

        if counters.latencies_ms.len() == self.sample_capacity {
            counters.latencies_ms.pop_front();
        }
        counters.latencies_ms.push_back(latency_ms);
    }

    /// Counters plus the p95 estimate. Gate figures are filled in by the caller.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let counters = self.counters.lock().expect("metrics mutex poisoned");
        MetricsSnapshot {
            total: counters.total,
            success: counters.success,
            failure: counters.failure,
            classifications: counters
                .classifications
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
            p95: p95(&counters.latencies_ms),
            in_flight: 0,
            queue_length: 0,
        }
    }
}

fn p95(samples: &VecDeque<u64>) -> u64 {
    if samples.is_empty() {
        return 0;
    }
    let mut sorted: Vec<u64> = samples.iter().copied().collect();
    sorted.sort_unstable();
    let idx = (sorted.len() * 95 / 100).min(sorted.len() - 1);
    sorted[idx]
}

//! Fixed-window rate limiter.
//!
//! # Design Decisions
//! - Fixed window, not sliding or token bucket: bursts at window edges are accepted
//! - `count <= limit` is enforced by rejecting, never by clamping
//! - Process-wide: one window shared by every caller

use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::time::Instant;

use crate::config::RateLimitConfig;

/// Header values describing a rate limit rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitInfo {
    /// Requests allowed per window.
    pub limit: u32,
    /// Requests left in the current window.
    pub remaining: u32,
    /// Unix time (seconds) when the window resets.
    pub reset_at_epoch_secs: u64,
    /// Whole seconds until the window resets, rounded up.
    pub retry_after_secs: u64,
}

/// Result of asking the limiter for admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Rejected(RateLimitInfo),
}

struct RateWindow {
    window_start: Instant,
    count: u32,
}

/// Counts requests per fixed window and rejects once the cap is reached.
pub struct RateLimiter {
    window: Mutex<RateWindow>,
    limit: u32,
    window_duration: Duration,
}

impl RateLimiter {
    pub fn new(limit: u32, window_duration: Duration) -> Self {
        Self {
            window: Mutex::new(RateWindow {
                window_start: Instant::now(),
                count: 0,
            }),
            limit,
            window_duration,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.limit, config.window())
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Count one request against the current window.
    pub fn try_acquire(&self) -> RateDecision {
        let now = Instant::now();
        let mut window = self.window.lock().expect("rate limiter mutex poisoned");

        if now.duration_since(window.window_start) >= self.window_duration {
            window.window_start = now;
            window.count = 0;
        }

        if window.count >= self.limit {
            let reset_at = window.window_start + self.window_duration;
            let until_reset = reset_at.saturating_duration_since(now);
            return RateDecision::Rejected(RateLimitInfo {
                limit: self.limit,
                remaining: 0,
                reset_at_epoch_secs: epoch_secs_after(until_reset),
                retry_after_secs: ceil_secs(until_reset),
            });
        }

        window.count += 1;
        RateDecision::Allowed {
            remaining: self.limit - window.count,
        }
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
    millis.div_ceil(1000)
}

fn epoch_secs_after(duration: Duration) -> u64 {
    let reset = SystemTime::now() + duration;
    let since_epoch = reset.duration_since(UNIX_EPOCH).unwrap_or_default();
    since_epoch.as_secs() + u64::from(since_epoch.subsec_nanos() > 0)
}

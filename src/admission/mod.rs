//! Admission control subsystem.
//!
//! # Data Flow
//! ```text
//! Validated job:
//!     → rate_limit.rs (fixed-window counter, reject when cap reached)
//!     → concurrency.rs (take a slot, or wait FIFO in a bounded queue)
//!     → execution
//!     → slot dropped, next waiter woken
//! ```
//!
//! # Design Decisions
//! - Process-wide limits, no per-caller partitioning
//! - Rejections are terminal; callers retry using the returned hints
//! - Checks that cannot suspend (rate limit) run before checks that can (queue)

pub mod concurrency;
pub mod rate_limit;

pub use concurrency::{Acquire, ConcurrencyGate, Slot};
pub use rate_limit::{RateDecision, RateLimitInfo, RateLimiter};

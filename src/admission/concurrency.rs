//! Bounded concurrency with a FIFO wait queue.
//!
//! # Responsibilities
//! - Cap the number of jobs executing at once
//! - Queue excess requests in arrival order, up to a fixed capacity
//! - Give up on a queued request after its wait timeout
//!
//! # Design Decisions
//! - Slots are permits of a tokio `Semaphore`, which is FIFO-fair: a released
//!   permit goes to the oldest waiter and cannot be taken by a newcomer
//! - A slot is an RAII guard; dropping it hands the slot to the next waiter
//! - Queue capacity is reserved with a compare-exchange loop before waiting,
//!   so `queue_len() <= queue_max` holds under contention
//! - A timed-out waiter is dropped from the semaphore queue by `timeout`

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;

use crate::config::ConcurrencyConfig;

/// Outcome of asking the gate for a slot.
#[derive(Debug)]
pub enum Acquire {
    /// A slot is held until the guard is dropped.
    Acquired(Slot),
    /// Waited in the queue for the full timeout without getting a slot.
    TimedOut,
    /// All slots busy and the queue is at capacity; nothing was waited for.
    QueueFull,
}

/// Limits in-flight jobs and queues the overflow.
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    max_concurrency: usize,
    queue_max: usize,
    waiting: Arc<AtomicUsize>,
}

impl ConcurrencyGate {
    pub fn new(max_concurrency: usize, queue_max: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
            queue_max,
            waiting: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn from_config(config: &ConcurrencyConfig) -> Self {
        Self::new(config.max_concurrency, config.queue_max)
    }

    /// Take a slot, waiting in line for at most `wait` if none is free.
    pub async fn acquire(&self, wait: Duration) -> Acquire {
        if let Ok(permit) = self.semaphore.clone().try_acquire_owned() {
            return Acquire::Acquired(Slot { _permit: permit });
        }

        let Some(_ticket) = self.try_enqueue() else {
            tracing::debug!(queue_max = self.queue_max, "Wait queue full, rejecting");
            return Acquire::QueueFull;
        };

        match timeout(wait, self.semaphore.clone().acquire_owned()).await {
            Ok(Ok(permit)) => Acquire::Acquired(Slot { _permit: permit }),
            Ok(Err(_)) => {
                tracing::error!("Concurrency semaphore closed while waiting");
                Acquire::TimedOut
            }
            Err(_) => {
                tracing::debug!(wait_ms = wait.as_millis() as u64, "Queue wait timed out");
                Acquire::TimedOut
            }
        }
    }

    /// Jobs currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.max_concurrency
            .saturating_sub(self.semaphore.available_permits())
    }

    /// Requests currently waiting for a slot.
    pub fn queue_len(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    fn try_enqueue(&self) -> Option<QueueTicket> {
        let mut prev = self.waiting.load(Ordering::SeqCst);
        loop {
            if prev >= self.queue_max {
                return None;
            }
            match self.waiting.compare_exchange_weak(
                prev,
                prev + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => break,
                Err(x) => prev = x,
            }
        }
        Some(QueueTicket {
            waiting: Arc::clone(&self.waiting),
        })
    }
}

/// A held concurrency slot. Dropping it releases the slot to the next waiter.
#[derive(Debug)]
pub struct Slot {
    _permit: OwnedSemaphorePermit,
}

/// A reserved place in the wait queue, given back on drop.
struct QueueTicket {
    waiting: Arc<AtomicUsize>,
}

impl Drop for QueueTicket {
    fn drop(&mut self) {
        self.waiting.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    const WAIT: Duration = Duration::from_secs(5);

    fn expect_slot(outcome: Acquire) -> Slot {
        match outcome {
            Acquire::Acquired(slot) => slot,
            other => panic!("expected a slot, got {:?}", other),
        }
    }

    async fn settle_until(gate: &ConcurrencyGate, queued: usize) {
        while gate.queue_len() != queued {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn acquires_immediately_below_capacity() {
        let gate = ConcurrencyGate::new(2, 0);
        let a = expect_slot(gate.acquire(WAIT).await);
        let b = expect_slot(gate.acquire(WAIT).await);
        assert_eq!(gate.in_flight(), 2);

        drop(a);
        assert_eq!(gate.in_flight(), 1);
        drop(b);
        assert_eq!(gate.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn full_queue_rejects_without_waiting() {
        let gate = Arc::new(ConcurrencyGate::new(1, 1));
        let _held = expect_slot(gate.acquire(WAIT).await);

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.acquire(WAIT).await })
        };
        settle_until(&gate, 1).await;

        let started = tokio::time::Instant::now();
        assert!(matches!(gate.acquire(WAIT).await, Acquire::QueueFull));
        assert_eq!(started.elapsed(), Duration::ZERO);

        waiter.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn zero_queue_rejects_when_saturated() {
        let gate = ConcurrencyGate::new(1, 0);
        let _held = expect_slot(gate.acquire(WAIT).await);
        assert!(matches!(gate.acquire(WAIT).await, Acquire::QueueFull));
    }

    #[tokio::test(start_paused = true)]
    async fn waiter_times_out_and_leaves_queue() {
        let gate = ConcurrencyGate::new(1, 4);
        let _held = expect_slot(gate.acquire(WAIT).await);

        let outcome = gate.acquire(Duration::from_millis(100)).await;
        assert!(matches!(outcome, Acquire::TimedOut));
        assert_eq!(gate.queue_len(), 0);
        assert_eq!(gate.in_flight(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn release_wakes_waiter_without_double_counting() {
        let gate = Arc::new(ConcurrencyGate::new(1, 4));
        let held = expect_slot(gate.acquire(WAIT).await);

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move {
                let slot = expect_slot(gate.acquire(WAIT).await);
                let in_flight = gate.in_flight();
                drop(slot);
                in_flight
            })
        };
        settle_until(&gate, 1).await;

        drop(held);
        assert_eq!(waiter.await.unwrap(), 1);
        assert_eq!(gate.in_flight(), 0);
        assert_eq!(gate.queue_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn waiters_are_admitted_in_arrival_order() {
        let gate = Arc::new(ConcurrencyGate::new(1, 8));
        let held = expect_slot(gate.acquire(WAIT).await);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut handles = Vec::new();
        for id in 1..=3 {
            let waiter_gate = gate.clone();
            let tx = tx.clone();
            handles.push(tokio::spawn(async move {
                let slot = expect_slot(waiter_gate.acquire(WAIT).await);
                tx.send(id).unwrap();
                tokio::time::sleep(Duration::from_millis(10)).await;
                drop(slot);
            }));
            settle_until(&gate, id).await;
        }

        drop(held);
        for handle in handles {
            handle.await.unwrap();
        }

        let order: Vec<usize> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn newcomer_cannot_overtake_queued_waiter() {
        let gate = Arc::new(ConcurrencyGate::new(1, 8));
        let held = expect_slot(gate.acquire(WAIT).await);

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move {
                let _slot = expect_slot(gate.acquire(WAIT).await);
                tokio::time::sleep(Duration::from_millis(50)).await;
            })
        };
        settle_until(&gate, 1).await;

        drop(held);
        // The released permit is already assigned to the queued waiter.
        assert!(matches!(gate.acquire(Duration::ZERO).await, Acquire::TimedOut));
        waiter.await.unwrap();
    }
}

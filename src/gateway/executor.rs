//! The unit of work behind the gateway.
//!
//! The real ad-platform call is not wired in yet; [`StubExecutor`] stands in
//! for it and always succeeds after a fixed delay.

use std::time::Duration;

use async_trait::async_trait;

use crate::gateway::error::ExecutionError;
use crate::gateway::job::Job;

/// Performs one link update against the downstream.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, job: &Job) -> Result<(), ExecutionError>;
}

/// Succeeds after a fixed delay.
#[derive(Debug, Clone)]
pub struct StubExecutor {
    delay: Duration,
}

impl StubExecutor {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Executor for StubExecutor {
    async fn execute(&self, job: &Job) -> Result<(), ExecutionError> {
        tracing::debug!(
            link = %job.link,
            delay_ms = self.delay.as_millis() as u64,
            "Stub execution"
        );
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}

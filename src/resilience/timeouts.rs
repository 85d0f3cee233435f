//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap downstream calls with a deadline
//! - Cancel the call cleanly when the deadline passes
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from other execution errors
//! - A timed-out execution counts as a downstream failure

use std::future::Future;
use std::time::Duration;

use crate::gateway::ExecutionError;

/// Run `call`, failing with [`ExecutionError::Timeout`] once `deadline` passes.
pub async fn with_deadline<F>(deadline: Duration, call: F) -> Result<(), ExecutionError>
where
    F: Future<Output = Result<(), ExecutionError>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(ExecutionError::Timeout(deadline)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn slow_call_times_out() {
        let result = with_deadline(Duration::from_millis(100), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(())
        })
        .await;
        assert!(matches!(
            result,
            Err(ExecutionError::Timeout(d)) if d == Duration::from_millis(100)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn fast_call_passes_result_through() {
        let ok = with_deadline(Duration::from_secs(1), async { Ok(()) }).await;
        assert!(ok.is_ok());

        let err = with_deadline(Duration::from_secs(1), async {
            Err(ExecutionError::Transport("reset".into()))
        })
        .await;
        assert!(matches!(err, Err(ExecutionError::Transport(_))));
    }
}

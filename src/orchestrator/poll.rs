//! Bounded convergence polling.
//!
//! Cloud deletions are asynchronous: the orchestrator issues a request and
//! then re-queries until the resource reaches its terminal state. Every wait
//! is capped by [`PollPolicy::timeout`] and fails with
//! `LabError::ConvergenceTimeout` instead of blocking forever.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::errors::{LabError, LabResult};

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_CONVERGENCE_TIMEOUT_SECS: u64 = 1800;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Pause between two checks.
    pub interval: Duration,
    /// Total time allowed for convergence.
    pub timeout: Duration,
}

impl PollPolicy {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            Duration::from_secs(DEFAULT_CONVERGENCE_TIMEOUT_SECS),
        )
    }
}

/// Call `check` until it reports `true` or the policy's timeout elapses.
///
/// A failed external query while polling is treated as transient: it is
/// logged and the next check is attempted. Any other error aborts the wait.
pub async fn poll_until<F, Fut>(policy: PollPolicy, what: &str, mut check: F) -> LabResult<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = LabResult<bool>>,
{
    let started = Instant::now();
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        match check().await {
            Ok(true) => {
                tracing::debug!(what, attempts, "converged");
                return Ok(());
            }
            Ok(false) => {}
            Err(err @ LabError::ExternalCommandFailed { .. }) => {
                tracing::warn!(what, error = %err, "status query failed, will retry");
            }
            Err(err) => return Err(err),
        }

        let elapsed = started.elapsed();
        if elapsed >= policy.timeout {
            return Err(LabError::ConvergenceTimeout {
                what: what.to_string(),
                waited_secs: elapsed.as_secs(),
            });
        }

        tracing::info!(what, attempts, "waiting {}s", policy.interval.as_secs());
        tokio::time::sleep(policy.interval.min(policy.timeout - elapsed)).await;
    }
}

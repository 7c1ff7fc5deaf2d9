//! Exponential backoff policy and the transient-failure retry wrapper.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::errors::{EtlError, Result};

/// Exponential backoff parameters.
///
/// The delay for attempt `n` (zero-based) is `min(start * factor^n, ceiling)`.
/// With `stop_at_ceiling` set, the wrapper propagates the failure once the
/// computed delay has reached the ceiling; otherwise it retries indefinitely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub start: Duration,
    pub factor: u32,
    pub ceiling: Duration,
    pub stop_at_ceiling: bool,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            start: Duration::from_millis(100),
            factor: 2,
            ceiling: Duration::from_secs(5),
            stop_at_ceiling: false,
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `attempt` (zero-based), capped at the ceiling.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let ceiling_ms = u64::try_from(self.ceiling.as_millis()).unwrap_or(u64::MAX);
        let start_ms = u64::try_from(self.start.as_millis()).unwrap_or(u64::MAX);
        let delay_ms = u64::from(self.factor.max(1))
            .checked_pow(attempt)
            .and_then(|mult| start_ms.checked_mul(mult))
            .unwrap_or(ceiling_ms);
        Duration::from_millis(delay_ms.min(ceiling_ms))
    }
}

/// Forward-progress flag shared between the retry wrapper and its operation.
///
/// An operation that fails transiently after doing useful work (a session
/// that completed cycles before losing its connection) marks progress; the
/// wrapper then restarts the delay schedule instead of resuming where the
/// last outage left off.
#[derive(Debug, Clone, Default)]
pub struct Progress {
    flag: Arc<AtomicBool>,
}

impl Progress {
    pub fn mark(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    fn take(&self) -> bool {
        self.flag.swap(false, Ordering::Relaxed)
    }
}

/// Run `op`, retrying on transient failures with exponential delay.
///
/// Non-transient errors propagate immediately. With `stop_at_ceiling`, the
/// failure propagates after the first sleep whose computed delay reached the
/// ceiling. A failure that arrives after `op` marked [`Progress`] restarts
/// the delay schedule from the first attempt.
pub async fn retry_transient<T, F, Fut>(policy: &BackoffPolicy, mut op: F) -> Result<T>
where
    F: FnMut(Progress) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let progress = Progress::default();
    let mut attempt = 0u32;
    loop {
        match op(progress.clone()).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() => {
                if progress.take() {
                    attempt = 0;
                }
                let delay = policy.delay_for_attempt(attempt);
                tracing::error!(
                    error = %err,
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Transient failure, backing off before retry"
                );
                tokio::time::sleep(delay).await;
                if policy.stop_at_ceiling && delay >= policy.ceiling {
                    tracing::error!("Backoff ceiling reached, giving up");
                    return Err(err);
                }
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

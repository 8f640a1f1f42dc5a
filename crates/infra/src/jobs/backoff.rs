//! Backoff controller: bounded, adaptive retry around a single external call.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use super::types::RetryPolicy;

/// How a failed attempt should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retry {
    /// Explicit "too many requests"; wait with linear backoff.
    Throttle { retry_after: Option<Duration> },
    /// Might succeed on retry; wait a short fixed delay.
    Transient,
    /// Retrying cannot help; fail the item now.
    Permanent,
    /// Stop immediately and escalate to the caller.
    Abort,
}

/// Throttle bookkeeping for one call chain.
///
/// Scoped to a single item's attempts so one job's throttling never delays
/// another job's first attempt. Reset on any success.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitState {
    consecutive_throttles: u32,
    last_throttle_wait: Duration,
}

impl RateLimitState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn consecutive_throttles(&self) -> u32 {
        self.consecutive_throttles
    }

    /// Register a throttle signal and return how long to wait.
    ///
    /// The wait is linear in the consecutive throttle count, raised to any
    /// server-provided `retry_after`, and never shorter than the previous
    /// throttle wait in this chain. It never exceeds `policy.max_backoff`.
    pub fn on_throttle(&mut self, policy: &RetryPolicy, retry_after: Option<Duration>) -> Duration {
        self.consecutive_throttles = self.consecutive_throttles.saturating_add(1);
        let linear = policy.throttle_delay(self.consecutive_throttles);
        let wait = linear
            .max(retry_after.unwrap_or(Duration::ZERO))
            .max(self.last_throttle_wait)
            .min(policy.max_backoff);
        self.last_throttle_wait = wait;
        wait
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Result of a backoff-wrapped call.
#[derive(Debug)]
pub struct BackoffOutcome<T, E> {
    pub result: Result<T, E>,
    /// Attempts made, including the first.
    pub attempts: u32,
    /// Waits slept between attempts, in order.
    pub waits: Vec<Duration>,
}

/// Run `op` until it succeeds, the retry budget runs out, or `classify`
/// declares the error non-retryable.
///
/// `op` receives the 1-indexed attempt number. The returned error is the
/// last one observed.
pub async fn call_with_backoff<T, E, F, Fut, C>(
    policy: &RetryPolicy,
    state: &mut RateLimitState,
    classify: C,
    mut op: F,
) -> BackoffOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> Retry,
    E: Display,
{
    let mut attempts = 0u32;
    let mut waits = Vec::new();

    loop {
        attempts += 1;
        let err = match op(attempts).await {
            Ok(value) => {
                state.reset();
                return BackoffOutcome {
                    result: Ok(value),
                    attempts,
                    waits,
                };
            }
            Err(err) => err,
        };

        let wait = match classify(&err) {
            Retry::Permanent | Retry::Abort => {
                return BackoffOutcome {
                    result: Err(err),
                    attempts,
                    waits,
                };
            }
            Retry::Throttle { retry_after } => state.on_throttle(policy, retry_after),
            Retry::Transient => policy.transient_delay.min(policy.max_backoff),
        };

        let retries_used = attempts - 1;
        if !policy.should_retry(retries_used) {
            warn!(attempts, error = %err, "retries exhausted");
            return BackoffOutcome {
                result: Err(err),
                attempts,
                waits,
            };
        }

        debug!(
            attempt = attempts,
            wait_ms = wait.as_millis() as u64,
            throttles = state.consecutive_throttles(),
            error = %err,
            "retrying after backoff"
        );
        tokio::time::sleep(wait).await;
        waits.push(wait);
    }
}

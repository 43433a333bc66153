//! ==============================================================================
//! retry.rs - bounded retry for link, broker and clock-sync waits
//! ==============================================================================
//!
//! purpose:
//!     every wait in the device is bounded. `retry_bounded` runs an operation up
//!     to `max_attempts` times with a fixed delay between tries and reports the
//!     outcome. `Reconnector` is the non-blocking variant: the caller asks whether
//!     an attempt is allowed now and reports the result, and after the budget is
//!     spent the gate stays closed for `cooldown` before the counter resets.
//!
//! ==============================================================================

use anyhow::{anyhow, Result};
use std::future::Future;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    pub cooldown: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self { max_attempts: max_attempts.max(1), delay, cooldown: Duration::ZERO }
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }
}

/// Run `op` until it succeeds or the attempt budget is spent.
///
/// `op` receives the 1-based attempt number.
pub async fn retry_bounded<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = None;

    for attempt in 1..=policy.max_attempts {
        match op(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(attempt, "{} succeeded after retry", label);
                }
                return Ok(value);
            }
            Err(e) => {
                tracing::debug!(attempt, max = policy.max_attempts, "{} failed: {:#}", label, e);
                last_error = Some(e);
            }
        }

        if attempt < policy.max_attempts {
            tokio::time::sleep(policy.delay).await;
        }
    }

    let cause = last_error.map(|e| format!("{:#}", e)).unwrap_or_default();
    Err(anyhow!("{} gave up after {} attempts: {}", label, policy.max_attempts, cause))
}

/// Attempt gate with a retry budget and a cooldown once the budget is spent
#[derive(Debug)]
pub struct Reconnector {
    policy: RetryPolicy,
    failures: u32,
    resume_at: Option<Instant>,
}

impl Reconnector {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy, failures: 0, resume_at: None }
    }

    /// whether an attempt may be made at `now`
    pub fn ready(&self, now: Instant) -> bool {
        self.resume_at.map_or(true, |at| now >= at)
    }

    /// how long the caller should wait before the next attempt
    pub fn record_failure(&mut self, now: Instant) -> Duration {
        self.failures += 1;
        let wait = if self.failures >= self.policy.max_attempts {
            tracing::warn!(
                attempts = self.failures,
                "retry budget exhausted, holding off for {:?}",
                self.policy.cooldown
            );
            self.failures = 0;
            self.policy.cooldown
        } else {
            self.policy.delay
        };
        self.resume_at = Some(now + wait);
        wait
    }

    pub fn record_success(&mut self) {
        self.failures = 0;
        self.resume_at = None;
    }

    #[cfg(test)]
    pub fn failures(&self) -> u32 {
        self.failures
    }
}

//! Bounded retry around blocking collaborator calls.
//!
//! Port calls (store queries, remote quote fetches) can fail transiently. A
//! [`RetryPolicy`] runs the call a fixed number of times and hands back a
//! caller-supplied default once attempts are exhausted, so transport errors
//! never escape a portal, universe or factor call.

use crate::domain::error::QuantError;
use std::thread;
use std::time::Duration;

/// Longest single sleep between attempts.
pub const MAX_DELAY: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Multiplier applied to the delay after each failed attempt (1.0 = fixed delay).
    pub backoff: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1000),
            backoff: 1.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that tries once and never sleeps.
    pub fn none() -> Self {
        RetryPolicy {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            backoff: 1.0,
        }
    }

    /// Delay after the `attempt`-th failure, saturating at [`MAX_DELAY`].
    fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.backoff.max(1.0).powi(exp);
        Duration::try_from_secs_f64(self.base_delay.as_secs_f64() * factor)
            .map_or(MAX_DELAY, |d| d.min(MAX_DELAY))
    }

    /// Run `op` until it succeeds or the attempt budget is spent.
    pub fn call<T, F>(&self, mut op: F) -> Result<T, QuantError>
    where
        F: FnMut() -> Result<T, QuantError>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op() {
                Ok(v) => return Ok(v),
                Err(e) if attempt >= attempts => return Err(e),
                Err(e) => {
                    tracing::debug!(attempt, error = %e, "retrying after failure");
                    let delay = self.delay_for(attempt);
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// Like [`call`](Self::call) but logs the final error under `what` and
    /// returns `default` instead of failing.
    pub fn call_or_default<T, F>(&self, what: &str, default: T, op: F) -> T
    where
        F: FnMut() -> Result<T, QuantError>,
    {
        match self.call(op) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(call = what, error = %e, "collaborator call failed, using default");
                default
            }
        }
    }
}

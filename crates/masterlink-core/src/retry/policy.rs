use std::time::Duration;

use super::classify::ErrorClass;
use super::error::LinkError;
use crate::control::CancelToken;

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Do not retry this error.
    NoRetry,
    /// Retry after the given delay.
    RetryAfter(Duration),
}

/// Bounded retry with a fixed, attempt-indexed delay table.
///
/// Attempt `n` (1-based) that fails with a retriable error sleeps for
/// `delays[n - 1]` before attempt `n + 1`. The table always has at least
/// `max_attempts - 1` entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delays: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            delays: vec![
                Duration::from_secs(1),
                Duration::from_secs(5),
                Duration::from_secs(15),
            ],
        }
    }
}

impl RetryPolicy {
    /// Build a policy; fails when the delay table cannot cover every retry.
    pub fn new(max_attempts: u32, delays: Vec<Duration>) -> Result<Self, LinkError> {
        if max_attempts == 0 {
            return Err(LinkError::config("max_attempts must be at least 1"));
        }
        let needed = (max_attempts - 1) as usize;
        if delays.len() < needed {
            return Err(LinkError::config(format!(
                "delay table has {} entries but {} attempts need {}",
                delays.len(),
                max_attempts,
                needed
            )));
        }
        Ok(Self {
            max_attempts,
            delays,
        })
    }

    /// A policy that never retries.
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            delays: Vec::new(),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }

    /// Decide what to do after `attempt` (1-based) failed with an error of `class`.
    pub fn decide(&self, attempt: u32, class: ErrorClass) -> RetryDecision {
        if attempt >= self.max_attempts {
            return RetryDecision::NoRetry;
        }

        match class {
            ErrorClass::ImmediateFail => RetryDecision::NoRetry,
            ErrorClass::ConnectionFatal | ErrorClass::Transient => {
                let idx = attempt.saturating_sub(1) as usize;
                match self.delays.get(idx) {
                    Some(d) => RetryDecision::RetryAfter(*d),
                    None => RetryDecision::NoRetry,
                }
            }
        }
    }

    /// Run `op` under this policy. See [`run_with_retry`](super::run_with_retry).
    pub fn execute<T, F>(&self, cancel: &CancelToken, label: &str, op: F) -> Result<T, LinkError>
    where
        F: FnMut(u32) -> Result<T, LinkError>,
    {
        super::run::run_with_retry(self, cancel, label, op)
    }
}

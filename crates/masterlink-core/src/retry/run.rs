//! Retry loop: run a closure until success, a terminal error, or cancellation.

use super::classify;
use super::error::LinkError;
use super::policy::{RetryDecision, RetryPolicy};
use crate::control::CancelToken;

/// Runs `f` until it succeeds or the retry policy says to stop.
///
/// `f` receives the 1-based attempt number. Cancellation is checked before
/// every attempt and during each backoff sleep; a cancelled wait surfaces as a
/// `Cancelled` error, never as the operation's error. When retries run out the
/// last error is returned as-is.
pub fn run_with_retry<T, F>(
    policy: &RetryPolicy,
    cancel: &CancelToken,
    label: &str,
    mut f: F,
) -> Result<T, LinkError>
where
    F: FnMut(u32) -> Result<T, LinkError>,
{
    let mut attempt = 1u32;
    loop {
        if cancel.is_cancelled() {
            return Err(LinkError::cancelled(format!(
                "{label}: cancelled before attempt {attempt}"
            )));
        }
        match f(attempt) {
            Ok(v) => return Ok(v),
            Err(e) => {
                let class = classify::classify(&e);
                match policy.decide(attempt, class) {
                    RetryDecision::NoRetry => {
                        tracing::debug!(
                            op = label,
                            attempt,
                            ?class,
                            error = %e,
                            "giving up"
                        );
                        return Err(e);
                    }
                    RetryDecision::RetryAfter(d) => {
                        tracing::debug!(
                            op = label,
                            attempt,
                            ?class,
                            delay_ms = d.as_millis() as u64,
                            error = %e,
                            "retrying after backoff"
                        );
                        cancel.sleep(d)?;
                        attempt += 1;
                    }
                }
            }
        }
    }
}

//! Cooperative cancellation for callers: cancel tokens and a registry of
//! in-flight calls.
//!
//! A service bound to a `CancelToken` checks it before every attempt and
//! waits on it during backoff, so `cancel()` unblocks a sleeping retry loop
//! immediately. A remote call already in progress is not interrupted.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};

use crate::retry::LinkError;

#[derive(Debug, Default)]
struct CancelState {
    cancelled: Mutex<bool>,
    wake: Condvar,
}

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelState>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    fn flag(&self) -> MutexGuard<'_, bool> {
        self.inner
            .cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the flag and wake every waiter.
    pub fn cancel(&self) {
        *self.flag() = true;
        self.inner.wake.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.flag()
    }

    /// Sleep for `d` unless cancelled first. Returns `Cancelled` if the flag is
    /// set before or during the wait. A `d` past the clock's range waits until
    /// cancelled.
    pub fn sleep(&self, d: Duration) -> Result<(), LinkError> {
        let deadline = Instant::now().checked_add(d);
        let mut cancelled = self.flag();
        loop {
            if *cancelled {
                return Err(LinkError::cancelled("cancelled while waiting to retry"));
            }
            cancelled = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(());
                    }
                    let (guard, _) = self
                        .inner
                        .wake
                        .wait_timeout(cancelled, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner);
                    guard
                }
                None => self
                    .inner
                    .wake
                    .wait(cancelled)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
    }
}

/// Shared registry of call id -> cancel token. An embedding application
/// registers each long-running caller and can cancel it from another thread.
#[derive(Default)]
pub struct CallControl {
    calls: RwLock<HashMap<u64, CancelToken>>,
}

impl CallControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a caller; returns the token to bind its services to.
    pub fn register(&self, call_id: u64) -> CancelToken {
        let token = CancelToken::new();
        self.calls
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(call_id, token.clone());
        token
    }

    /// Unregister a caller (when it finishes, success or failure).
    pub fn unregister(&self, call_id: u64) {
        self.calls
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&call_id);
    }

    /// Request cancellation of a registered caller. Returns false if unknown.
    pub fn request_cancel(&self, call_id: u64) -> bool {
        match self
            .calls
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&call_id)
        {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

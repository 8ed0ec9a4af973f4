//! Retry and backoff policy.
//!
//! This module encapsulates error classification (connection-fatal,
//! immediate-fail, transient) and the bounded backoff loop so that the
//! connector factory and every service share one consistent policy.

mod classify;
mod error;
mod policy;
mod run;

pub use classify::{
    class_of_kind, classify, decisive_kind, is_connection_fatal, is_immediate_fail, ErrorClass,
};
pub use error::{BoxError, LinkError, LinkErrorKind};
pub use policy::{RetryDecision, RetryPolicy};
pub use run::run_with_retry;

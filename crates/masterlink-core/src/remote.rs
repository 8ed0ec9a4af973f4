//! Remote-side capabilities the connector consumes.
//!
//! The connector only depends on these traits and does not know about any
//! particular transport. `memory` and `transport` provide implementations.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::identity::Identity;
use crate::retry::LinkError;

/// Scalar key of a record in a remote collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordKey {
    Int(i64),
    Str(String),
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKey::Int(i) => write!(f, "{}", i),
            RecordKey::Str(s) => f.write_str(s),
        }
    }
}

/// Integers parse as `Int`, anything else is a `Str` key.
impl FromStr for RecordKey {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.parse::<i64>() {
            Ok(i) => RecordKey::Int(i),
            Err(_) => RecordKey::Str(s.to_string()),
        })
    }
}

impl From<i64> for RecordKey {
    fn from(i: i64) -> Self {
        RecordKey::Int(i)
    }
}

impl From<i32> for RecordKey {
    fn from(i: i32) -> Self {
        RecordKey::Int(i64::from(i))
    }
}

impl From<&str> for RecordKey {
    fn from(s: &str) -> Self {
        RecordKey::Str(s.to_string())
    }
}

impl From<String> for RecordKey {
    fn from(s: String) -> Self {
        RecordKey::Str(s)
    }
}

/// Per-service remote handle. Absent records are `Ok(None)`, not errors.
pub trait RawCollection: Send + Sync {
    fn raw_get(&self, key: &RecordKey) -> Result<Option<Value>, LinkError>;
    fn raw_get_all(&self) -> Result<Vec<Value>, LinkError>;
    fn raw_size(&self) -> Result<usize, LinkError>;
    fn raw_is_empty(&self) -> Result<bool, LinkError>;
}

/// One open session on the master.
pub trait RemoteSession: Send + Sync {
    /// Handle for the named collection exported by this session.
    fn collection(&self, name: &str) -> Result<Arc<dyn RawCollection>, LinkError>;
    fn set_locale(&self, locale: &str) -> Result<(), LinkError>;
    /// Release remote exports. Called at most once by the owning session.
    fn close(&self) -> Result<(), LinkError>;
}

/// Remote entry point returned by a registry lookup.
pub trait HandleFactory: Send + Sync {
    /// Perform the login handshake. Login errors fail immediately; transport
    /// errors are connection-fatal.
    fn open(&self, identity: &Identity) -> Result<Box<dyn RemoteSession>, LinkError>;
}

/// Name service that locates handle factories.
pub trait Registry: Send + Sync {
    /// Fails with `NotBound` when nothing is registered under `name`.
    fn lookup(&self, name: &str) -> Result<Arc<dyn HandleFactory>, LinkError>;
}

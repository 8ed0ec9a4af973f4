//! Typed front for one remote collection.
//!
//! Every operation fetches the live handle from the owning connector on each
//! attempt, runs the raw call outside the connector lock, and lets the
//! connector drop the session on connection-fatal errors before the retry
//! policy decides what happens next.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::connector::{Connector, HandleSlot};
use crate::control::CancelToken;
use crate::remote::{RawCollection, RecordKey};
use crate::retry::{run_with_retry, LinkError};

/// Scalar key types a service can be keyed by.
pub trait ServiceKey: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static {
    fn to_record_key(&self) -> RecordKey;
}

impl ServiceKey for i64 {
    fn to_record_key(&self) -> RecordKey {
        RecordKey::Int(*self)
    }
}

impl ServiceKey for i32 {
    fn to_record_key(&self) -> RecordKey {
        RecordKey::Int(i64::from(*self))
    }
}

impl ServiceKey for u32 {
    fn to_record_key(&self) -> RecordKey {
        RecordKey::Int(i64::from(*self))
    }
}

impl ServiceKey for String {
    fn to_record_key(&self) -> RecordKey {
        RecordKey::Str(self.clone())
    }
}

impl ServiceKey for RecordKey {
    fn to_record_key(&self) -> RecordKey {
        self.clone()
    }
}

/// Integer-keyed service.
pub type IntService<V> = Service<i64, V>;
/// String-keyed service.
pub type StrService<V> = Service<String, V>;

/// Typed, retrying client for one named collection on the master.
pub struct Service<K, V> {
    name: Arc<str>,
    connector: Connector,
    slot: Arc<HandleSlot>,
    cancel: CancelToken,
    _marker: PhantomData<fn(K) -> V>,
}

impl<K, V> Clone for Service<K, V> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            connector: self.connector.clone(),
            slot: Arc::clone(&self.slot),
            cancel: self.cancel.clone(),
            _marker: PhantomData,
        }
    }
}

impl<K, V> fmt::Debug for Service<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("name", &self.name)
            .field("bound", &self.is_bound())
            .finish()
    }
}

impl<K, V> Service<K, V> {
    pub(crate) fn new(name: &str, connector: Connector, slot: Arc<HandleSlot>) -> Self {
        Self {
            name: Arc::from(name),
            connector,
            slot,
            cancel: CancelToken::new(),
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn connector(&self) -> &Connector {
        &self.connector
    }

    /// Same service, observing the caller's cancel token.
    pub fn with_cancel(&self, cancel: CancelToken) -> Self {
        Self {
            cancel,
            ..self.clone()
        }
    }

    /// True while the connector has a handle assigned to this service.
    pub fn is_bound(&self) -> bool {
        self.slot.get().is_some()
    }
}

impl<K: ServiceKey, V: DeserializeOwned> Service<K, V> {
    /// Fetch one record. A key the master does not know is `Ok(None)`.
    pub fn get(&self, key: &K) -> Result<Option<V>, LinkError> {
        let key = key.to_record_key();
        self.call("get", |h| h.raw_get(&key)?.map(decode::<V>).transpose())
    }

    /// Snapshot of every record, in the order the master returns them.
    pub fn get_all(&self) -> Result<Vec<V>, LinkError> {
        self.call("get_all", |h| {
            h.raw_get_all()?.into_iter().map(decode::<V>).collect()
        })
    }

    pub fn size(&self) -> Result<usize, LinkError> {
        self.call("size", |h| h.raw_size())
    }

    pub fn is_empty(&self) -> Result<bool, LinkError> {
        self.call("is_empty", |h| h.raw_is_empty())
    }

    fn call<T>(
        &self,
        op: &str,
        mut f: impl FnMut(&dyn RawCollection) -> Result<T, LinkError>,
    ) -> Result<T, LinkError> {
        let label = format!("{}.{}", self.name, op);
        run_with_retry(self.connector.call_policy(), &self.cancel, &label, |_attempt| {
            let handle = self.connector.live_handle(&self.name)?;
            f(handle.as_ref()).map_err(|e| {
                self.connector.disconnect_if_needed(&e);
                e
            })
        })
    }
}

fn decode<V: DeserializeOwned>(value: Value) -> Result<V, LinkError> {
    serde_json::from_value(value).map_err(LinkError::from)
}

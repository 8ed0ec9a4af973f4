//! Scriptable in-process master for resilience tests.
//!
//! Counts handshakes and session closes, records which session (by handshake
//! serial, starting at 1) served each successful raw call, and injects faults
//! into upcoming raw calls or handshakes.

use masterlink_core::identity::Identity;
use masterlink_core::remote::{HandleFactory, RawCollection, RecordKey, Registry, RemoteSession};
use masterlink_core::{LinkError, LinkErrorKind};
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Failure injected into a raw call. `n` in messages is the raw call number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Bare transport reset (connection-fatal).
    TransportReset,
    /// Application error wrapping a transport reset (connection-fatal via the chain).
    WrappedTransport,
    /// Plain remote application error (transient).
    Application,
    /// Application error wrapping a login failure (immediate-fail via the chain).
    LoginWrapped,
    /// Programmer error (immediate-fail).
    NoSuchElement,
}

impl Fault {
    fn to_error(self, n: usize) -> LinkError {
        match self {
            Fault::TransportReset => LinkError::transport(format!("connection reset #{n}")),
            Fault::WrappedTransport => LinkError::wrap(
                LinkErrorKind::Application,
                format!("call adapter failed #{n}"),
                LinkError::transport("connection reset by peer"),
            ),
            Fault::Application => LinkError::application(format!("busy #{n}")),
            Fault::LoginWrapped => LinkError::wrap(
                LinkErrorKind::Application,
                format!("remote call failed #{n}"),
                LinkError::login("session credentials expired"),
            ),
            Fault::NoSuchElement => LinkError::no_such_element(format!("bogus lookup #{n}")),
        }
    }
}

#[derive(Default)]
struct Inner {
    handshakes: AtomicUsize,
    handshake_failures: AtomicUsize,
    closes: AtomicUsize,
    raw_calls: AtomicUsize,
    faults: Mutex<VecDeque<Fault>>,
    always: Mutex<Option<Fault>>,
    records: Mutex<BTreeMap<RecordKey, Value>>,
    served_by: Mutex<Vec<usize>>,
    open_delay: Mutex<Duration>,
    reject_logins: AtomicBool,
    fail_locale: AtomicBool,
    remote_locale: Mutex<Option<String>>,
    missing: Mutex<Vec<String>>,
}

#[derive(Clone, Default)]
pub struct ScriptedMaster {
    inner: Arc<Inner>,
}

impl ScriptedMaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> Arc<dyn Registry> {
        Arc::new(self.clone())
    }

    pub fn insert(&self, key: impl Into<RecordKey>, value: Value) {
        self.inner.records.lock().unwrap().insert(key.into(), value);
    }

    /// Fail the next raw call with `fault` (queued, first in first out).
    pub fn fail_next(&self, fault: Fault) {
        self.inner.faults.lock().unwrap().push_back(fault);
    }

    /// Fail every raw call with `fault` until cleared.
    pub fn fail_always(&self, fault: Option<Fault>) {
        *self.inner.always.lock().unwrap() = fault;
    }

    /// Fail the next `n` handshakes with a transport error.
    pub fn fail_handshakes(&self, n: usize) {
        self.inner.handshake_failures.store(n, Ordering::SeqCst);
    }

    /// Make `collection(name)` fail with no-such-element on every session.
    pub fn drop_collection(&self, name: &str) {
        self.inner.missing.lock().unwrap().push(name.to_string());
    }

    pub fn set_open_delay(&self, d: Duration) {
        *self.inner.open_delay.lock().unwrap() = d;
    }

    pub fn reject_logins(&self, reject: bool) {
        self.inner.reject_logins.store(reject, Ordering::SeqCst);
    }

    pub fn fail_locale(&self, fail: bool) {
        self.inner.fail_locale.store(fail, Ordering::SeqCst);
    }

    pub fn handshakes(&self) -> usize {
        self.inner.handshakes.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.inner.closes.load(Ordering::SeqCst)
    }

    pub fn raw_calls(&self) -> usize {
        self.inner.raw_calls.load(Ordering::SeqCst)
    }

    pub fn served_by(&self) -> Vec<usize> {
        self.inner.served_by.lock().unwrap().clone()
    }

    pub fn remote_locale(&self) -> Option<String> {
        self.inner.remote_locale.lock().unwrap().clone()
    }
}

impl Registry for ScriptedMaster {
    fn lookup(&self, _name: &str) -> Result<Arc<dyn HandleFactory>, LinkError> {
        Ok(Arc::new(self.clone()))
    }
}

impl HandleFactory for ScriptedMaster {
    fn open(&self, identity: &Identity) -> Result<Box<dyn RemoteSession>, LinkError> {
        let delay = *self.inner.open_delay.lock().unwrap();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        if self.inner.reject_logins.load(Ordering::SeqCst) {
            return Err(LinkError::login(format!("bad credential for {}", identity.authenticate_as)));
        }
        let pending = self.inner.handshake_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.inner.handshake_failures.store(pending - 1, Ordering::SeqCst);
            return Err(LinkError::transport("registry unreachable"));
        }
        let serial = self.inner.handshakes.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Box::new(ScriptedSession {
            master: self.clone(),
            serial,
        }))
    }
}

struct ScriptedSession {
    master: ScriptedMaster,
    serial: usize,
}

impl RemoteSession for ScriptedSession {
    fn collection(&self, name: &str) -> Result<Arc<dyn RawCollection>, LinkError> {
        if self.master.inner.missing.lock().unwrap().iter().any(|m| m == name) {
            return Err(LinkError::no_such_element(format!("no collection {name}")));
        }
        Ok(Arc::new(ScriptedCollection {
            master: self.master.clone(),
            serial: self.serial,
        }))
    }

    fn set_locale(&self, locale: &str) -> Result<(), LinkError> {
        if self.master.inner.fail_locale.load(Ordering::SeqCst) {
            return Err(LinkError::application("locale update rejected"));
        }
        *self.master.inner.remote_locale.lock().unwrap() = Some(locale.to_string());
        Ok(())
    }

    fn close(&self) -> Result<(), LinkError> {
        self.master.inner.closes.fetch_add(1, Ordering::SeqCst);
        Err(LinkError::transport("close failed: peer already gone"))
    }
}

struct ScriptedCollection {
    master: ScriptedMaster,
    serial: usize,
}

impl ScriptedCollection {
    fn step(&self) -> Result<(), LinkError> {
        let inner = &self.master.inner;
        let n = inner.raw_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(fault) = inner.faults.lock().unwrap().pop_front() {
            return Err(fault.to_error(n));
        }
        if let Some(fault) = *inner.always.lock().unwrap() {
            return Err(fault.to_error(n));
        }
        inner.served_by.lock().unwrap().push(self.serial);
        Ok(())
    }
}

impl RawCollection for ScriptedCollection {
    fn raw_get(&self, key: &RecordKey) -> Result<Option<Value>, LinkError> {
        self.step()?;
        Ok(self.master.inner.records.lock().unwrap().get(key).cloned())
    }

    fn raw_get_all(&self) -> Result<Vec<Value>, LinkError> {
        self.step()?;
        Ok(self.master.inner.records.lock().unwrap().values().cloned().collect())
    }

    fn raw_size(&self) -> Result<usize, LinkError> {
        self.step()?;
        Ok(self.master.inner.records.lock().unwrap().len())
    }

    fn raw_is_empty(&self) -> Result<bool, LinkError> {
        self.step()?;
        Ok(self.master.inner.records.lock().unwrap().is_empty())
    }
}

//! In-process master and registry.
//!
//! `MemoryMaster` holds named collections of JSON records and optional
//! per-principal credentials. It backs the loopback server and is the
//! simplest way to run a connector without a network. `revoke_sessions()`
//! invalidates every open session, the way a master restart would.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::identity::{Credential, Identity};
use crate::remote::{HandleFactory, RawCollection, RecordKey, Registry, RemoteSession};
use crate::retry::LinkError;

type Collections = BTreeMap<String, BTreeMap<RecordKey, Value>>;

/// On-disk form of a master: collections keyed by record key, plus users.
///
/// Object keys that parse as integers become integer record keys.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MasterSnapshot {
    #[serde(default)]
    pub collections: BTreeMap<String, BTreeMap<String, Value>>,
    /// principal -> password. Empty means any login is accepted.
    #[serde(default)]
    pub users: BTreeMap<String, String>,
}

#[derive(Default)]
struct MasterState {
    collections: RwLock<Collections>,
    users: RwLock<HashMap<String, Credential>>,
    epoch: AtomicU64,
    sessions_opened: AtomicU64,
}

impl MasterState {
    fn read(&self) -> std::sync::RwLockReadGuard<'_, Collections> {
        self.collections.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Collections> {
        self.collections.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// In-memory master service. Clones share the same data.
#[derive(Clone, Default)]
pub struct MemoryMaster {
    state: Arc<MasterState>,
}

impl MemoryMaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: MasterSnapshot) -> Self {
        let master = Self::new();
        for (name, records) in snapshot.collections {
            master.define(&name);
            for (key, value) in records {
                let key: RecordKey = key.parse().unwrap_or(RecordKey::Str(key));
                master.insert(&name, key, value);
            }
        }
        for (principal, password) in snapshot.users {
            master.add_user(&principal, Credential::new(password));
        }
        master
    }

    /// Load a snapshot from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let snapshot: MasterSnapshot =
            serde_json::from_str(&data).with_context(|| format!("parse {}", path.display()))?;
        Ok(Self::from_snapshot(snapshot))
    }

    /// Create an empty collection if it does not exist.
    pub fn define(&self, collection: &str) {
        self.state.write().entry(collection.to_string()).or_default();
    }

    pub fn insert(&self, collection: &str, key: impl Into<RecordKey>, value: Value) {
        self.state
            .write()
            .entry(collection.to_string())
            .or_default()
            .insert(key.into(), value);
    }

    pub fn remove(&self, collection: &str, key: &RecordKey) -> Option<Value> {
        self.state.write().get_mut(collection)?.remove(key)
    }

    pub fn add_user(&self, principal: &str, credential: Credential) {
        self.state
            .users
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(principal.to_string(), credential);
    }

    /// Invalidate every open session; their handles fail with `NotExported`.
    pub fn revoke_sessions(&self) {
        self.state.epoch.fetch_add(1, Ordering::SeqCst);
    }

    /// Number of successful logins so far.
    pub fn sessions_opened(&self) -> u64 {
        self.state.sessions_opened.load(Ordering::SeqCst)
    }

    fn check_login(&self, identity: &Identity) -> Result<(), LinkError> {
        let users = self
            .state
            .users
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        if users.is_empty() {
            return Ok(());
        }
        match users.get(&identity.authenticate_as) {
            Some(expected) if expected == &identity.credential => Ok(()),
            _ => Err(LinkError::login(format!(
                "invalid credential for {}",
                identity.authenticate_as
            ))),
        }
    }
}

impl HandleFactory for MemoryMaster {
    fn open(&self, identity: &Identity) -> Result<Box<dyn RemoteSession>, LinkError> {
        self.check_login(identity)?;
        self.state.sessions_opened.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(
            principal = %identity.connect_as,
            read_only = identity.read_only,
            target = ?identity.target,
            "memory master opened session"
        );
        Ok(Box::new(MemorySession {
            lease: Lease {
                state: Arc::clone(&self.state),
                epoch: self.state.epoch.load(Ordering::SeqCst),
                closed: Arc::new(AtomicBool::new(false)),
            },
            locale: Mutex::new(identity.locale.clone()),
        }))
    }
}

/// Liveness of one session, shared with the handles it exported.
#[derive(Clone)]
struct Lease {
    state: Arc<MasterState>,
    epoch: u64,
    closed: Arc<AtomicBool>,
}

impl Lease {
    fn check(&self) -> Result<(), LinkError> {
        if self.closed.load(Ordering::SeqCst)
            || self.epoch != self.state.epoch.load(Ordering::SeqCst)
        {
            return Err(LinkError::not_exported("session is no longer exported"));
        }
        Ok(())
    }
}

struct MemorySession {
    lease: Lease,
    locale: Mutex<String>,
}

impl RemoteSession for MemorySession {
    fn collection(&self, name: &str) -> Result<Arc<dyn RawCollection>, LinkError> {
        self.lease.check()?;
        if !self.lease.state.read().contains_key(name) {
            return Err(LinkError::no_such_element(format!("no collection named {name:?}")));
        }
        Ok(Arc::new(MemoryCollection {
            lease: self.lease.clone(),
            name: name.to_string(),
        }))
    }

    fn set_locale(&self, locale: &str) -> Result<(), LinkError> {
        self.lease.check()?;
        *self.locale.lock().unwrap_or_else(PoisonError::into_inner) = locale.to_string();
        Ok(())
    }

    fn close(&self) -> Result<(), LinkError> {
        self.lease.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct MemoryCollection {
    lease: Lease,
    name: String,
}

impl MemoryCollection {
    fn with<T>(&self, f: impl FnOnce(&BTreeMap<RecordKey, Value>) -> T) -> Result<T, LinkError> {
        self.lease.check()?;
        let collections = self.lease.state.read();
        let records = collections
            .get(&self.name)
            .ok_or_else(|| LinkError::not_exported(format!("collection {:?} was dropped", self.name)))?;
        Ok(f(records))
    }
}

impl RawCollection for MemoryCollection {
    fn raw_get(&self, key: &RecordKey) -> Result<Option<Value>, LinkError> {
        self.with(|r| r.get(key).cloned())
    }

    fn raw_get_all(&self) -> Result<Vec<Value>, LinkError> {
        self.with(|r| r.values().cloned().collect())
    }

    fn raw_size(&self) -> Result<usize, LinkError> {
        self.with(|r| r.len())
    }

    fn raw_is_empty(&self) -> Result<bool, LinkError> {
        self.with(|r| r.is_empty())
    }
}

/// Name -> handle factory map. Clones share the same bindings.
#[derive(Clone, Default)]
pub struct MemoryRegistry {
    entries: Arc<RwLock<HashMap<String, Arc<dyn HandleFactory>>>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, name: &str, factory: Arc<dyn HandleFactory>) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), factory);
    }

    pub fn unbind(&self, name: &str) -> bool {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some()
    }
}

impl Registry for MemoryRegistry {
    fn lookup(&self, name: &str) -> Result<Arc<dyn HandleFactory>, LinkError> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| LinkError::not_bound(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::LinkErrorKind;
    use serde_json::json;

    fn alice() -> Identity {
        Identity::new("alice", Credential::new("pw"))
    }

    #[test]
    fn login_checked_only_when_users_exist() {
        let master = MemoryMaster::new();
        assert!(master.open(&alice()).is_ok());
        master.add_user("alice", Credential::new("other"));
        let err = master.open(&alice()).err().unwrap();
        assert_eq!(err.kind(), LinkErrorKind::Login);
        assert_eq!(master.sessions_opened(), 1);
    }

    #[test]
    fn revoked_session_handles_are_not_exported() {
        let master = MemoryMaster::new();
        master.insert("accounts", 1, json!({"id": 1}));
        let session = master.open(&alice()).unwrap();
        let handle = session.collection("accounts").unwrap();
        assert_eq!(handle.raw_size().unwrap(), 1);
        master.revoke_sessions();
        let err = handle.raw_size().unwrap_err();
        assert_eq!(err.kind(), LinkErrorKind::NotExported);
    }

    #[test]
    fn closed_session_handles_are_not_exported() {
        let master = MemoryMaster::new();
        master.define("accounts");
        let session = master.open(&alice()).unwrap();
        let handle = session.collection("accounts").unwrap();
        session.close().unwrap();
        assert_eq!(
            handle.raw_is_empty().unwrap_err().kind(),
            LinkErrorKind::NotExported
        );
    }

    #[test]
    fn unknown_collection_is_no_such_element() {
        let master = MemoryMaster::new();
        let session = master.open(&alice()).unwrap();
        let err = session.collection("missing").err().unwrap();
        assert_eq!(err.kind(), LinkErrorKind::NoSuchElement);
    }

    #[test]
    fn snapshot_keys_parse_as_integers_when_possible() {
        let snapshot: MasterSnapshot = serde_json::from_value(json!({
            "collections": {
                "accounts": { "1": {"name": "root"}, "svc": {"name": "svc"} }
            },
            "users": { "alice": "pw" }
        }))
        .unwrap();
        let master = MemoryMaster::from_snapshot(snapshot);
        let handle = master.open(&alice()).unwrap().collection("accounts").unwrap();
        assert!(handle.raw_get(&RecordKey::Int(1)).unwrap().is_some());
        assert!(handle.raw_get(&RecordKey::from("svc")).unwrap().is_some());
        assert!(handle.raw_get(&RecordKey::from("1")).unwrap().is_none());
    }

    #[test]
    fn registry_reports_not_bound() {
        let registry = MemoryRegistry::new();
        let err = registry.lookup("MasterServer").err().unwrap();
        assert_eq!(err.kind(), LinkErrorKind::NotBound);
        registry.bind("MasterServer", Arc::new(MemoryMaster::new()));
        assert!(registry.lookup("MasterServer").is_ok());
        assert!(registry.unbind("MasterServer"));
    }
}

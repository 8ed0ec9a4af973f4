//! Server-side connector cache.
//!
//! Repeated requests for the same identity reuse one connector (and its
//! exported remote objects) instead of logging in again. The whole
//! lookup-or-create runs under one lock, so two callers asking for the same
//! identity never create two connectors.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::connector::Connector;
use crate::factory::ConnectorFactory;
use crate::identity::Identity;
use crate::retry::LinkError;

/// Cache key: everything about an identity except its mutable locale.
///
/// The credential is kept as a SHA-256 digest, not plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityKey {
    pub connect_as: String,
    pub authenticate_as: String,
    pub credential_digest: String,
    pub target: Option<String>,
    pub read_only: bool,
}

impl IdentityKey {
    pub fn from_identity(identity: &Identity) -> Self {
        Self {
            connect_as: identity.connect_as.clone(),
            authenticate_as: identity.authenticate_as.clone(),
            credential_digest: identity.credential.digest(),
            target: identity.target.clone(),
            read_only: identity.read_only,
        }
    }
}

/// Connectors cached by identity.
pub struct ConnectorCache {
    factory: ConnectorFactory,
    entries: Mutex<HashMap<IdentityKey, Connector>>,
}

impl ConnectorCache {
    pub fn new(factory: ConnectorFactory) -> Self {
        Self {
            factory,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<IdentityKey, Connector>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cached connector for `identity`, or a freshly connected one.
    /// Closed entries are replaced.
    pub fn get_connector(&self, identity: Identity) -> Result<Connector, LinkError> {
        let key = IdentityKey::from_identity(&identity);
        let mut entries = self.lock();
        if let Some(existing) = entries.get(&key) {
            if !existing.is_closed() {
                tracing::debug!(principal = %key.connect_as, "reusing cached connector");
                return Ok(existing.clone());
            }
            entries.remove(&key);
        }
        let connector = self.factory.new_connector(identity)?;
        tracing::info!(
            principal = %key.connect_as,
            target = ?key.target,
            read_only = key.read_only,
            "cached new connector"
        );
        entries.insert(key, connector.clone());
        Ok(connector)
    }

    /// Remove and close the connector for `identity`. Returns true if one was cached.
    pub fn evict(&self, identity: &Identity) -> bool {
        let key = IdentityKey::from_identity(identity);
        let removed = self.lock().remove(&key);
        match removed {
            Some(connector) => {
                connector.close();
                true
            }
            None => false,
        }
    }

    /// Close and forget every cached connector.
    pub fn close_all(&self) {
        let drained: Vec<Connector> = self.lock().drain().map(|(_, c)| c).collect();
        for connector in drained {
            connector.close();
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::LinkSettings;
    use crate::identity::Credential;
    use crate::memory::{MemoryMaster, MemoryRegistry};
    use std::sync::Arc;

    fn cache() -> (MemoryMaster, ConnectorCache) {
        let master = MemoryMaster::new();
        master.define("accounts");
        let registry = MemoryRegistry::new();
        registry.bind("MasterServer", Arc::new(master.clone()));
        let factory =
            ConnectorFactory::new(Arc::new(registry), LinkSettings::default(), ["accounts"]);
        (master, ConnectorCache::new(factory))
    }

    fn alice(pw: &str) -> Identity {
        Identity::new("alice", Credential::new(pw))
    }

    #[test]
    fn same_identity_reuses_one_connector() {
        let (master, cache) = cache();
        let a = cache.get_connector(alice("pw")).unwrap();
        let b = cache.get_connector(alice("pw").with_locale("de")).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(master.sessions_opened(), 1);
        a.set_locale("fr").unwrap();
        assert_eq!(b.locale(), "fr");
    }

    #[test]
    fn key_distinguishes_credential_target_and_read_only() {
        let (master, cache) = cache();
        cache.get_connector(alice("pw")).unwrap();
        cache.get_connector(alice("other")).unwrap();
        cache.get_connector(alice("pw").with_target("db-2")).unwrap();
        cache.get_connector(alice("pw").read_only(true)).unwrap();
        assert_eq!(cache.len(), 4);
        assert_eq!(master.sessions_opened(), 4);
    }

    #[test]
    fn key_never_holds_plaintext() {
        let key = IdentityKey::from_identity(&alice("hunter2"));
        assert!(!format!("{:?}", key).contains("hunter2"));
        assert_eq!(key.credential_digest.len(), 64);
    }

    #[test]
    fn evict_closes_and_forgets() {
        let (master, cache) = cache();
        let c = cache.get_connector(alice("pw")).unwrap();
        assert!(cache.evict(&alice("pw")));
        assert!(c.is_closed());
        assert!(cache.is_empty());
        assert!(!cache.evict(&alice("pw")));
        cache.get_connector(alice("pw")).unwrap();
        assert_eq!(master.sessions_opened(), 2);
    }

    #[test]
    fn closed_entries_are_replaced() {
        let (_master, cache) = cache();
        let first = cache.get_connector(alice("pw")).unwrap();
        first.close();
        let second = cache.get_connector(alice("pw")).unwrap();
        assert!(!second.is_closed());
        assert!(second.is_connected());
    }

    #[test]
    fn close_all_empties_the_cache() {
        let (_master, cache) = cache();
        let c = cache.get_connector(alice("pw")).unwrap();
        cache.close_all();
        assert!(cache.is_empty());
        assert!(c.is_closed());
    }
}

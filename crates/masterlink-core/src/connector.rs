//! Connector: owns zero or one live session and the fixed set of service
//! slots that mirror it.
//!
//! All Disconnected <-> Connected transitions run under one mutex per
//! connector, together with the bulk assignment or clearing of every slot.
//! Services copy a handle out under that lock and make the remote call
//! without it.

use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use crate::identity::Identity;
use crate::remote::{RawCollection, Registry};
use crate::retry::{self, LinkError, RetryPolicy};
use crate::service::{Service, ServiceKey};
use crate::session::Session;

/// Construction-time settings for connectors and the factory that builds them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSettings {
    /// Name the master's handle factory is bound under in the registry.
    pub registry_name: String,
    /// Retry policy applied to every service operation.
    pub call_policy: RetryPolicy,
    /// Retry policy applied by the factory when acquiring a connector.
    pub connect_policy: RetryPolicy,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            registry_name: "MasterServer".to_string(),
            call_policy: RetryPolicy::default(),
            connect_policy: RetryPolicy::default(),
        }
    }
}

/// Per-service handle slot. Written only under the connector lock.
pub(crate) struct HandleSlot {
    handle: RwLock<Option<Arc<dyn RawCollection>>>,
}

impl HandleSlot {
    fn new() -> Self {
        Self {
            handle: RwLock::new(None),
        }
    }

    pub(crate) fn get(&self) -> Option<Arc<dyn RawCollection>> {
        self.handle
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set(&self, handle: Option<Arc<dyn RawCollection>>) {
        *self.handle.write().unwrap_or_else(PoisonError::into_inner) = handle;
    }
}

struct LinkState {
    identity: Identity,
    session: Option<Session>,
    /// Number of successful handshakes so far.
    generation: u64,
    closed: bool,
}

struct Link {
    registry: Arc<dyn Registry>,
    settings: LinkSettings,
    names: Vec<String>,
    slots: HashMap<String, Arc<HandleSlot>>,
    state: Mutex<LinkState>,
}

impl Drop for Link {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(session) = state.session.take() {
            session.close();
        }
    }
}

/// Shared handle to one connection to the master. Clones share the session.
#[derive(Clone)]
pub struct Connector {
    link: Arc<Link>,
}

impl fmt::Debug for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector")
            .field("registry_name", &self.link.settings.registry_name)
            .field("services", &self.link.names)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl Connector {
    /// Create a disconnected connector exporting the given services.
    /// The catalog is fixed for the connector's lifetime.
    pub fn new<I, S>(
        registry: Arc<dyn Registry>,
        identity: Identity,
        catalog: I,
        settings: LinkSettings,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = Vec::new();
        for name in catalog {
            let name = name.into();
            if !names.contains(&name) {
                names.push(name);
            }
        }
        let slots = names
            .iter()
            .map(|n| (n.clone(), Arc::new(HandleSlot::new())))
            .collect();
        Self {
            link: Arc::new(Link {
                registry,
                settings,
                names,
                slots,
                state: Mutex::new(LinkState {
                    identity,
                    session: None,
                    generation: 0,
                    closed: false,
                }),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LinkState> {
        self.link
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn slot(&self, name: &str) -> Result<&Arc<HandleSlot>, LinkError> {
        self.link
            .slots
            .get(name)
            .ok_or_else(|| LinkError::no_such_element(format!("unknown service {name:?}")))
    }

    /// Establish a session if none is up. A second caller racing on the lock
    /// finds the session already up and skips the handshake.
    pub fn connect(&self) -> Result<(), LinkError> {
        let mut state = self.lock();
        self.connect_locked(&mut state)
    }

    fn connect_locked(&self, state: &mut LinkState) -> Result<(), LinkError> {
        if state.closed {
            return Err(LinkError::closed());
        }
        if state.session.is_some() {
            return Ok(());
        }
        let session = Session::open(
            self.link.registry.as_ref(),
            &self.link.settings.registry_name,
            &state.identity,
            &self.link.names,
        )
        .map_err(|e| {
            tracing::debug!(
                registry = %self.link.settings.registry_name,
                error = %e,
                "handshake failed"
            );
            e
        })?;
        for (name, slot) in &self.link.slots {
            slot.set(session.handle(name));
        }
        state.session = Some(session);
        state.generation += 1;
        tracing::info!(
            principal = %state.identity.connect_as,
            registry = %self.link.settings.registry_name,
            generation = state.generation,
            "connected to master"
        );
        Ok(())
    }

    /// Drop the session and clear every slot. No-op when already disconnected.
    pub fn disconnect(&self) {
        let mut state = self.lock();
        Self::disconnect_locked(&self.link, &mut state);
    }

    fn disconnect_locked(link: &Link, state: &mut LinkState) {
        let Some(session) = state.session.take() else {
            return;
        };
        for slot in link.slots.values() {
            slot.set(None);
        }
        session.close();
        tracing::info!(
            principal = %state.identity.connect_as,
            generation = state.generation,
            "disconnected from master"
        );
    }

    /// Disconnect if `err` (or anything in its cause chain) says the session
    /// is broken. Returns true when a disconnect was requested.
    pub fn disconnect_if_needed(&self, err: &LinkError) -> bool {
        if retry::is_connection_fatal(err) {
            tracing::debug!(error = %err, "connection-fatal error; dropping session");
            self.disconnect();
            true
        } else {
            false
        }
    }

    /// Current handle for `name`, connecting first if needed.
    pub fn live_handle(&self, name: &str) -> Result<Arc<dyn RawCollection>, LinkError> {
        let slot = self.slot(name)?;
        let mut state = self.lock();
        self.connect_locked(&mut state)?;
        slot.get()
            .ok_or_else(|| LinkError::not_exported(format!("no handle for service {name:?}")))
    }

    /// Change the active locale: remote session first, then local state.
    /// A remote failure leaves the local locale untouched.
    pub fn set_locale(&self, locale: &str) -> Result<(), LinkError> {
        let mut state = self.lock();
        if let Some(session) = &state.session {
            session.set_locale(locale)?;
        }
        state.identity.locale = locale.to_string();
        Ok(())
    }

    /// Typed front for one service in the catalog.
    pub fn service<K, V>(&self, name: &str) -> Result<Service<K, V>, LinkError>
    where
        K: ServiceKey,
        V: DeserializeOwned,
    {
        let slot = Arc::clone(self.slot(name)?);
        Ok(Service::new(name, self.clone(), slot))
    }

    /// Disconnect and refuse further connects.
    pub fn close(&self) {
        let mut state = self.lock();
        Self::disconnect_locked(&self.link, &mut state);
        state.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn is_connected(&self) -> bool {
        self.lock().session.is_some()
    }

    /// Number of successful handshakes performed by this connector.
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    pub fn identity(&self) -> Identity {
        self.lock().identity.clone()
    }

    pub fn locale(&self) -> String {
        self.lock().identity.locale.clone()
    }

    pub fn service_names(&self) -> &[String] {
        &self.link.names
    }

    pub(crate) fn call_policy(&self) -> &RetryPolicy {
        &self.link.settings.call_policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Credential;
    use crate::memory::{MemoryMaster, MemoryRegistry};
    use crate::retry::LinkErrorKind;
    use serde_json::json;

    fn setup() -> (MemoryMaster, Connector) {
        let master = MemoryMaster::new();
        master.insert("accounts", 1, json!({"id": 1, "name": "root"}));
        master.insert("hosts", "web-1", json!({"name": "web-1"}));
        let registry = MemoryRegistry::new();
        registry.bind("MasterServer", Arc::new(master.clone()));
        let connector = Connector::new(
            Arc::new(registry),
            Identity::new("alice", Credential::new("pw")),
            ["accounts", "hosts"],
            LinkSettings::default(),
        );
        (master, connector)
    }

    #[test]
    fn starts_disconnected_and_connects_once() {
        let (master, c) = setup();
        assert!(!c.is_connected());
        c.connect().unwrap();
        c.connect().unwrap();
        assert!(c.is_connected());
        assert_eq!(c.generation(), 1);
        assert_eq!(master.sessions_opened(), 1);
    }

    #[test]
    fn disconnect_is_idempotent_and_clears_slots() {
        let (_master, c) = setup();
        c.connect().unwrap();
        let slot = Arc::clone(c.slot("accounts").unwrap());
        assert!(slot.get().is_some());
        c.disconnect();
        c.disconnect();
        assert!(!c.is_connected());
        assert!(slot.get().is_none());
    }

    #[test]
    fn live_handle_reconnects_after_disconnect() {
        let (master, c) = setup();
        c.live_handle("hosts").unwrap();
        c.disconnect();
        c.live_handle("hosts").unwrap();
        assert_eq!(c.generation(), 2);
        assert_eq!(master.sessions_opened(), 2);
    }

    #[test]
    fn unknown_service_is_no_such_element() {
        let (_master, c) = setup();
        let err = c.live_handle("nope").err().unwrap();
        assert_eq!(err.kind(), LinkErrorKind::NoSuchElement);
        assert!(c.service::<i64, serde_json::Value>("nope").is_err());
    }

    #[test]
    fn failed_handshake_stays_disconnected() {
        let registry = MemoryRegistry::new();
        let c = Connector::new(
            Arc::new(registry),
            Identity::new("alice", Credential::new("pw")),
            ["accounts"],
            LinkSettings::default(),
        );
        let err = c.connect().unwrap_err();
        assert_eq!(err.kind(), LinkErrorKind::NotBound);
        assert!(!c.is_connected());
        assert_eq!(c.generation(), 0);
    }

    #[test]
    fn disconnect_if_needed_only_for_fatal_errors() {
        let (_master, c) = setup();
        c.connect().unwrap();
        assert!(!c.disconnect_if_needed(&LinkError::application("busy")));
        assert!(c.is_connected());
        assert!(c.disconnect_if_needed(&LinkError::transport("reset")));
        assert!(!c.is_connected());
    }

    #[test]
    fn set_locale_updates_local_state_when_disconnected() {
        let (_master, c) = setup();
        c.set_locale("fr").unwrap();
        assert_eq!(c.locale(), "fr");
    }

    #[test]
    fn closed_connector_refuses_to_connect() {
        let (_master, c) = setup();
        c.connect().unwrap();
        c.close();
        assert!(c.is_closed());
        assert!(!c.is_connected());
        let err = c.live_handle("accounts").err().unwrap();
        assert_eq!(err.kind(), LinkErrorKind::Closed);
    }
}

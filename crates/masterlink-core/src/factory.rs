//! Builds connected connectors, retrying the registry lookup and handshake.

use std::sync::Arc;

use crate::connector::{Connector, LinkSettings};
use crate::control::CancelToken;
use crate::identity::Identity;
use crate::remote::Registry;
use crate::retry::{run_with_retry, LinkError};

/// Creates connectors that share one registry, settings, and service catalog.
#[derive(Clone)]
pub struct ConnectorFactory {
    registry: Arc<dyn Registry>,
    settings: LinkSettings,
    catalog: Vec<String>,
}

impl ConnectorFactory {
    pub fn new<I, S>(registry: Arc<dyn Registry>, settings: LinkSettings, catalog: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            registry,
            settings,
            catalog: catalog.into_iter().map(Into::into).collect(),
        }
    }

    pub fn settings(&self) -> &LinkSettings {
        &self.settings
    }

    pub fn catalog(&self) -> &[String] {
        &self.catalog
    }

    /// A new, already-connected connector for `identity`.
    pub fn new_connector(&self, identity: Identity) -> Result<Connector, LinkError> {
        self.new_connector_with(identity, &CancelToken::new())
    }

    /// Like `new_connector`, observing the caller's cancel token between attempts.
    pub fn new_connector_with(
        &self,
        identity: Identity,
        cancel: &CancelToken,
    ) -> Result<Connector, LinkError> {
        let connector = Connector::new(
            Arc::clone(&self.registry),
            identity,
            self.catalog.iter().cloned(),
            self.settings.clone(),
        );
        run_with_retry(&self.settings.connect_policy, cancel, "connect", |attempt| {
            tracing::debug!(
                registry = %self.settings.registry_name,
                attempt,
                "acquiring connector"
            );
            connector.connect()
        })?;
        Ok(connector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Credential;
    use crate::memory::{MemoryMaster, MemoryRegistry};
    use crate::retry::{LinkErrorKind, RetryPolicy};
    use std::time::Duration;

    fn settings() -> LinkSettings {
        LinkSettings {
            registry_name: "MasterServer".to_string(),
            call_policy: RetryPolicy::once(),
            connect_policy: RetryPolicy::new(3, vec![Duration::from_millis(1); 2]).unwrap(),
        }
    }

    #[test]
    fn returns_connected_connector() {
        let master = MemoryMaster::new();
        master.define("accounts");
        let registry = MemoryRegistry::new();
        registry.bind("MasterServer", Arc::new(master.clone()));
        let factory = ConnectorFactory::new(Arc::new(registry), settings(), ["accounts"]);
        let c = factory.new_connector(Identity::new("alice", Credential::new("pw"))).unwrap();
        assert!(c.is_connected());
        assert_eq!(c.service_names(), ["accounts".to_string()]);
        assert_eq!(master.sessions_opened(), 1);
    }

    #[test]
    fn login_failure_is_not_retried() {
        let master = MemoryMaster::new();
        master.add_user("alice", Credential::new("right"));
        let registry = MemoryRegistry::new();
        registry.bind("MasterServer", Arc::new(master.clone()));
        let factory = ConnectorFactory::new(Arc::new(registry), settings(), Vec::<String>::new());
        let err = factory
            .new_connector(Identity::new("alice", Credential::new("wrong")))
            .unwrap_err();
        assert_eq!(err.kind(), LinkErrorKind::Login);
    }

    #[test]
    fn unbound_registry_exhausts_connect_retries() {
        let factory =
            ConnectorFactory::new(Arc::new(MemoryRegistry::new()), settings(), ["accounts"]);
        let err = factory
            .new_connector(Identity::new("alice", Credential::new("pw")))
            .unwrap_err();
        assert_eq!(err.kind(), LinkErrorKind::NotBound);
    }
}

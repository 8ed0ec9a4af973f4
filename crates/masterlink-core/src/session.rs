//! One live remote session plus every per-service handle it exports.

use std::collections::HashMap;
use std::sync::Arc;

use crate::identity::Identity;
use crate::remote::{RawCollection, Registry, RemoteSession};
use crate::retry::LinkError;

pub(crate) struct Session {
    remote: Box<dyn RemoteSession>,
    handles: HashMap<String, Arc<dyn RawCollection>>,
}

impl Session {
    /// Look up `registry_name`, log in, and fetch a handle for every name.
    ///
    /// Either every handle is returned or none: if any fetch fails, the
    /// half-open remote session is closed before the error propagates.
    pub(crate) fn open(
        registry: &dyn Registry,
        registry_name: &str,
        identity: &Identity,
        names: &[String],
    ) -> Result<Self, LinkError> {
        let factory = registry.lookup(registry_name)?;
        let remote = factory.open(identity)?;
        let mut handles = HashMap::with_capacity(names.len());
        for name in names {
            match remote.collection(name) {
                Ok(handle) => {
                    handles.insert(name.clone(), handle);
                }
                Err(e) => {
                    if let Err(close_err) = remote.close() {
                        tracing::warn!(
                            service = %name,
                            error = %close_err,
                            "failed to close half-open session"
                        );
                    }
                    return Err(e);
                }
            }
        }
        Ok(Self { remote, handles })
    }

    pub(crate) fn handle(&self, name: &str) -> Option<Arc<dyn RawCollection>> {
        self.handles.get(name).cloned()
    }

    pub(crate) fn set_locale(&self, locale: &str) -> Result<(), LinkError> {
        self.remote.set_locale(locale)
    }

    /// Release remote exports. Failures are logged, never returned.
    pub(crate) fn close(self) {
        if let Err(e) = self.remote.close() {
            tracing::warn!(error = %e, "error while closing session");
        }
    }
}

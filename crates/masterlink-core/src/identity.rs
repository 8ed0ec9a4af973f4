//! Who a connector talks to the master as.

use sha2::{Digest, Sha256};
use std::fmt;

/// Opaque login secret. Never printed by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Plaintext, for handing to the handshake only.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// SHA-256 of the secret as lowercase hex.
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(self.0.as_bytes()))
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Login identity of one connector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub locale: String,
    /// Principal the session acts on behalf of.
    pub connect_as: String,
    /// Principal whose credential is checked.
    pub authenticate_as: String,
    pub credential: Credential,
    /// Optional target-host selector forwarded to the master.
    pub target: Option<String>,
    pub read_only: bool,
}

impl Identity {
    /// Identity that connects and authenticates as the same principal.
    pub fn new(principal: impl Into<String>, credential: Credential) -> Self {
        let principal = principal.into();
        Self {
            locale: "en".to_string(),
            connect_as: principal.clone(),
            authenticate_as: principal,
            credential,
            target: None,
            read_only: false,
        }
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn authenticated_by(mut self, principal: impl Into<String>) -> Self {
        self.authenticate_as = principal.into();
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }
}

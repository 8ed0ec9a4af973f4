//! Unified error type for remote calls.
//!
//! Every failure carries a [`LinkErrorKind`] tag set where the failure was
//! observed, plus an optional source. Wrapping one `LinkError` in another keeps
//! the inner tag reachable through `source()`, which is what the classifier
//! walks.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;

/// Boxed error used as the cause of a [`LinkError`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Where a failure came from. Drives retry and disconnect decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkErrorKind {
    /// Transport reset, refused, or closed mid-call.
    Transport,
    /// Remote object is no longer exported by the master.
    NotExported,
    /// A payload could not be decoded.
    Unmarshal,
    /// The registry has no entry under the requested name.
    NotBound,
    /// Login or authentication was rejected.
    Login,
    /// The caller cancelled the call.
    Cancelled,
    /// The requested element does not exist.
    NoSuchElement,
    /// Invalid configuration (short delay table, unsupported transport, ...).
    Config,
    /// The connector was closed explicitly.
    Closed,
    /// Any other remote-side application error.
    Application,
}

impl fmt::Display for LinkErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LinkErrorKind::Transport => "transport error",
            LinkErrorKind::NotExported => "object not exported",
            LinkErrorKind::Unmarshal => "unmarshal error",
            LinkErrorKind::NotBound => "not bound",
            LinkErrorKind::Login => "login failed",
            LinkErrorKind::Cancelled => "cancelled",
            LinkErrorKind::NoSuchElement => "no such element",
            LinkErrorKind::Config => "configuration error",
            LinkErrorKind::Closed => "connector closed",
            LinkErrorKind::Application => "application error",
        };
        f.write_str(s)
    }
}

/// Error returned by every connector and service operation.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct LinkError {
    kind: LinkErrorKind,
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl LinkError {
    pub fn new(kind: LinkErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Wrap `source` under a new kind tag. The source stays visible to the classifier.
    pub fn wrap(kind: LinkErrorKind, message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(LinkErrorKind::Transport, message)
    }

    pub fn not_exported(message: impl Into<String>) -> Self {
        Self::new(LinkErrorKind::NotExported, message)
    }

    pub fn unmarshal(message: impl Into<String>) -> Self {
        Self::new(LinkErrorKind::Unmarshal, message)
    }

    pub fn not_bound(name: &str) -> Self {
        Self::new(LinkErrorKind::NotBound, format!("no registry entry named {name:?}"))
    }

    pub fn login(message: impl Into<String>) -> Self {
        Self::new(LinkErrorKind::Login, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(LinkErrorKind::Cancelled, message)
    }

    pub fn no_such_element(message: impl Into<String>) -> Self {
        Self::new(LinkErrorKind::NoSuchElement, message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(LinkErrorKind::Config, message)
    }

    pub fn closed() -> Self {
        Self::new(LinkErrorKind::Closed, "connector has been closed")
    }

    pub fn application(message: impl Into<String>) -> Self {
        Self::new(LinkErrorKind::Application, message)
    }

    /// Kind tag of this error (not of its sources).
    pub fn kind(&self) -> LinkErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// True when the failure means "the thing asked for does not exist".
    pub fn is_not_found(&self) -> bool {
        matches!(self.kind, LinkErrorKind::NoSuchElement | LinkErrorKind::NotBound)
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == LinkErrorKind::Cancelled
    }
}

/// I/O kinds that mean the socket is gone.
pub(crate) fn is_transport_io(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::TimedOut
            | io::ErrorKind::WouldBlock
    )
}

impl From<io::Error> for LinkError {
    fn from(e: io::Error) -> Self {
        let kind = if is_transport_io(e.kind()) {
            LinkErrorKind::Transport
        } else {
            LinkErrorKind::Application
        };
        let message = e.to_string();
        Self::wrap(kind, message, e)
    }
}

impl From<serde_json::Error> for LinkError {
    fn from(e: serde_json::Error) -> Self {
        let message = e.to_string();
        Self::wrap(LinkErrorKind::Unmarshal, message, e)
    }
}

//! Classify link errors (and their cause chains) into retry classes.

use super::error::{is_transport_io, LinkError, LinkErrorKind};
use std::error::Error;
use std::io;

/// What a failure means for the session and the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Session presumed broken; drop it so the next attempt reconnects.
    ConnectionFatal,
    /// Never retried (bad login, cancellation, programmer error).
    ImmediateFail,
    /// Session still healthy; retry against the same handle.
    Transient,
}

/// Class of a single kind tag, ignoring any wrapped causes.
pub fn class_of_kind(kind: LinkErrorKind) -> ErrorClass {
    match kind {
        LinkErrorKind::Transport
        | LinkErrorKind::NotExported
        | LinkErrorKind::Unmarshal
        | LinkErrorKind::NotBound => ErrorClass::ConnectionFatal,
        LinkErrorKind::Login
        | LinkErrorKind::Cancelled
        | LinkErrorKind::NoSuchElement
        | LinkErrorKind::Config
        | LinkErrorKind::Closed => ErrorClass::ImmediateFail,
        LinkErrorKind::Application => ErrorClass::Transient,
    }
}

/// Classify an error by walking its full cause chain.
///
/// An immediate-fail link anywhere in the chain wins; otherwise any
/// connection-fatal link (tagged, or a raw socket `io::Error`) makes the whole
/// error fatal. Everything else is transient.
pub fn classify(err: &(dyn Error + 'static)) -> ErrorClass {
    deciding_kind(err)
        .map(class_of_kind)
        .unwrap_or(ErrorClass::Transient)
}

/// The kind that decides how `err` is classified. Falls back to the outermost
/// kind when nothing in the chain is immediate-fail or connection-fatal.
pub fn decisive_kind(err: &LinkError) -> LinkErrorKind {
    deciding_kind(err).unwrap_or_else(|| err.kind())
}

fn deciding_kind(err: &(dyn Error + 'static)) -> Option<LinkErrorKind> {
    let mut fatal = None;
    let mut cur: Option<&(dyn Error + 'static)> = Some(err);
    while let Some(e) = cur {
        let kind = if let Some(link) = e.downcast_ref::<LinkError>() {
            Some(link.kind())
        } else if let Some(io_err) = e.downcast_ref::<io::Error>() {
            is_transport_io(io_err.kind()).then_some(LinkErrorKind::Transport)
        } else {
            None
        };
        if let Some(kind) = kind {
            match class_of_kind(kind) {
                ErrorClass::ImmediateFail => return Some(kind),
                ErrorClass::ConnectionFatal => {
                    fatal.get_or_insert(kind);
                }
                ErrorClass::Transient => {}
            }
        }
        cur = e.source();
    }
    fatal
}

pub fn is_connection_fatal(err: &(dyn Error + 'static)) -> bool {
    classify(err) == ErrorClass::ConnectionFatal
}

pub fn is_immediate_fail(err: &(dyn Error + 'static)) -> bool {
    classify(err) == ErrorClass::ImmediateFail
}

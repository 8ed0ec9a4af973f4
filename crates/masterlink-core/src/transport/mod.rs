//! Loopback TCP transport.
//!
//! Frames are single-line JSON objects: the client sends a request tagged by
//! `op`, the server answers with `status: ok` and a value, or `status: err`
//! with the deciding kind of the error's cause chain and its message. So a
//! `not_exported` raised on the server, even wrapped, is just as
//! connection-fatal on the client.

mod client;
mod server;
mod wire;

pub use client::TcpRegistry;
pub use server::{serve, spawn};

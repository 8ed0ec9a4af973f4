//! Loopback TCP master for integration tests.
//!
//! Binds an ephemeral port, binds a `MemoryMaster` under the given registry
//! name, and serves it on a background thread until the process exits.

use masterlink_core::config::TargetConfig;
use masterlink_core::memory::{MemoryMaster, MemoryRegistry};
use masterlink_core::transport;
use std::net::TcpListener;
use std::sync::Arc;

pub fn start(master: MemoryMaster, registry_name: &str) -> TargetConfig {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let registry = MemoryRegistry::new();
    registry.bind(registry_name, Arc::new(master));
    transport::spawn(listener, Arc::new(registry));
    TargetConfig {
        host: "127.0.0.1".to_string(),
        port,
        io_timeout_secs: Some(5),
        ..TargetConfig::default()
    }
}

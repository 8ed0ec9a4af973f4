//! `masterlink serve` – run a loopback master from a JSON snapshot.

use anyhow::{Context, Result};
use masterlink_core::config::LinkConfig;
use masterlink_core::memory::{MemoryMaster, MemoryRegistry};
use masterlink_core::transport;
use std::net::TcpListener;
use std::path::Path;
use std::sync::Arc;

pub fn run_serve(cfg: &LinkConfig, data: &Path) -> Result<()> {
    let master = MemoryMaster::load(data)?;
    let registry = MemoryRegistry::new();
    registry.bind(&cfg.registry_name, Arc::new(master));

    let addr = cfg.target.address();
    let listener = TcpListener::bind(&addr).with_context(|| format!("bind {addr}"))?;
    println!(
        "Serving {} as {:?} on {}",
        data.display(),
        cfg.registry_name,
        listener.local_addr()?
    );
    transport::serve(listener, Arc::new(registry))?;
    Ok(())
}

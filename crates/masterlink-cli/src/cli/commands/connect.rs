//! Shared setup: one connected connector and a JSON-valued service.

use anyhow::{Context, Result};
use masterlink_core::config::LinkConfig;
use masterlink_core::transport::TcpRegistry;
use masterlink_core::{ConnectorFactory, RecordKey, Service};
use serde_json::Value;
use std::sync::Arc;

use crate::cli::ConnectArgs;

pub(super) fn open_service(
    cfg: &LinkConfig,
    connect: &ConnectArgs,
    service: &str,
) -> Result<Service<RecordKey, Value>> {
    let settings = cfg.settings().context("invalid retry configuration")?;
    let registry = Arc::new(TcpRegistry::new(cfg.target.clone()));
    let factory = ConnectorFactory::new(registry, settings, [service]);
    let connector = factory
        .new_connector(connect.identity())
        .with_context(|| format!("connect to {}", cfg.target.address()))?;
    Ok(connector.service(service)?)
}

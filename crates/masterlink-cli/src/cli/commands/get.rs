//! `masterlink get` – fetch one record by key.

use anyhow::Result;
use masterlink_core::config::LinkConfig;
use masterlink_core::RecordKey;

use super::connect::open_service;
use crate::cli::ConnectArgs;

pub fn run_get(cfg: &LinkConfig, connect: &ConnectArgs, service: &str, key: &str) -> Result<()> {
    let svc = open_service(cfg, connect, service)?;
    let key: RecordKey = key.parse()?;
    match svc.get(&key)? {
        Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
        None => anyhow::bail!("no record with key {} in {}", key, service),
    }
    Ok(())
}

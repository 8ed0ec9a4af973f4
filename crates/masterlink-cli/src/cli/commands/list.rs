//! `masterlink list` – print every record of a service.

use anyhow::Result;
use masterlink_core::config::LinkConfig;

use super::connect::open_service;
use crate::cli::ConnectArgs;

pub fn run_list(cfg: &LinkConfig, connect: &ConnectArgs, service: &str) -> Result<()> {
    let svc = open_service(cfg, connect, service)?;
    let records = svc.get_all()?;
    if records.is_empty() {
        println!("No records in {}.", service);
    }
    for record in records {
        println!("{}", serde_json::to_string(&record)?);
    }
    Ok(())
}

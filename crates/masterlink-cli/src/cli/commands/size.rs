//! `masterlink size` – count records in a service.

use anyhow::Result;
use masterlink_core::config::LinkConfig;

use super::connect::open_service;
use crate::cli::ConnectArgs;

pub fn run_size(cfg: &LinkConfig, connect: &ConnectArgs, service: &str) -> Result<()> {
    let svc = open_service(cfg, connect, service)?;
    println!("{}", svc.size()?);
    Ok(())
}

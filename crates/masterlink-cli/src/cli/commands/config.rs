//! `masterlink config` – show the effective configuration.

use anyhow::Result;
use masterlink_core::config::{self, LinkConfig};

pub fn run_config(cfg: &LinkConfig) -> Result<()> {
    println!("# {}", config::config_path()?.display());
    print!("{}", toml::to_string_pretty(cfg)?);
    if let Err(e) = cfg.settings() {
        println!("# warning: {}", e);
    }
    Ok(())
}

//! CLI for the masterlink client and loopback master.

mod commands;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use masterlink_core::config::{self, LinkConfig};
use masterlink_core::{Credential, Identity};
use std::path::PathBuf;

use commands::{run_config, run_get, run_list, run_serve, run_size};

/// Top-level CLI for masterlink.
#[derive(Debug, Parser)]
#[command(name = "masterlink")]
#[command(about = "masterlink: resilient client for a registry-mediated master service", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

/// Who to log in as and where the master lives.
#[derive(Debug, Clone, Args)]
pub struct ConnectArgs {
    /// Principal to connect as.
    #[arg(long, short = 'u', default_value = "guest")]
    pub user: String,
    /// Password of the authenticating principal.
    #[arg(long, default_value = "")]
    pub password: String,
    /// Authenticate as a different principal than the one connected as.
    #[arg(long, value_name = "PRINCIPAL")]
    pub authenticate_as: Option<String>,
    /// Target-host selector forwarded to the master.
    #[arg(long)]
    pub target: Option<String>,
    /// Open a read-only session.
    #[arg(long)]
    pub read_only: bool,
    /// Session locale (default "en").
    #[arg(long)]
    pub locale: Option<String>,
    /// Override the configured master host.
    #[arg(long)]
    pub host: Option<String>,
    /// Override the configured master port.
    #[arg(long)]
    pub port: Option<u16>,
}

impl ConnectArgs {
    pub fn identity(&self) -> Identity {
        let mut id = Identity::new(&self.user, Credential::new(&self.password))
            .read_only(self.read_only);
        if let Some(principal) = &self.authenticate_as {
            id = id.authenticated_by(principal);
        }
        if let Some(target) = &self.target {
            id = id.with_target(target);
        }
        if let Some(locale) = &self.locale {
            id = id.with_locale(locale);
        }
        id
    }

    /// Apply host/port overrides to the configured target.
    pub fn apply_to(&self, cfg: &mut LinkConfig) {
        if let Some(host) = &self.host {
            cfg.target.host = host.clone();
        }
        if let Some(port) = self.port {
            cfg.target.port = port;
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Serve a JSON snapshot as a loopback master.
    Serve {
        /// Path to the snapshot (`{"collections": {...}, "users": {...}}`).
        data: PathBuf,
        /// Address to bind (default: configured target host).
        #[arg(long)]
        host: Option<String>,
        /// Port to bind (default: configured target port).
        #[arg(long)]
        port: Option<u16>,
    },

    /// Fetch one record by key.
    Get {
        /// Service (collection) name.
        service: String,
        /// Record key; integers are integer keys, anything else a string key.
        key: String,
        #[command(flatten)]
        connect: ConnectArgs,
    },

    /// Print every record of a service, one JSON document per line.
    List {
        /// Service (collection) name.
        service: String,
        #[command(flatten)]
        connect: ConnectArgs,
    },

    /// Print the number of records in a service.
    Size {
        /// Service (collection) name.
        service: String,
        #[command(flatten)]
        connect: ConnectArgs,
    },

    /// Show the config file path and effective configuration.
    Config,
}

impl CliCommand {
    pub fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let mut cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Serve { data, host, port } => {
                if let Some(host) = host {
                    cfg.target.host = host;
                }
                if let Some(port) = port {
                    cfg.target.port = port;
                }
                run_serve(&cfg, &data)?;
            }
            CliCommand::Get {
                service,
                key,
                connect,
            } => {
                connect.apply_to(&mut cfg);
                run_get(&cfg, &connect, &service, &key)?;
            }
            CliCommand::List { service, connect } => {
                connect.apply_to(&mut cfg);
                run_list(&cfg, &connect, &service)?;
            }
            CliCommand::Size { service, connect } => {
                connect.apply_to(&mut cfg);
                run_size(&cfg, &connect, &service)?;
            }
            CliCommand::Config => run_config(&cfg)?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::connector::LinkSettings;
use crate::retry::{LinkError, RetryPolicy};

/// Retry policy parameters (optional sections in config.toml).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per call (including the first).
    pub max_attempts: u32,
    /// Delay in seconds after attempt 1, 2, ...; needs at least max_attempts - 1 entries.
    pub delays_secs: Vec<f64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            delays_secs: vec![1.0, 5.0, 15.0],
        }
    }
}

impl RetryConfig {
    /// Validate and convert into a `RetryPolicy`.
    pub fn to_policy(&self) -> Result<RetryPolicy, LinkError> {
        let mut delays = Vec::with_capacity(self.delays_secs.len());
        for &secs in &self.delays_secs {
            let delay = Duration::try_from_secs_f64(secs)
                .map_err(|e| LinkError::config(format!("invalid retry delay {secs}: {e}")))?;
            delays.push(delay);
        }
        RetryPolicy::new(self.max_attempts, delays)
    }
}

/// Transport security selector for the TCP transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportSecurity {
    #[default]
    Plain,
    Tls,
}

/// Where the master listens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub transport: TransportSecurity,
    /// Per-request socket timeout in seconds (None = block indefinitely).
    #[serde(default)]
    pub io_timeout_secs: Option<u64>,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 1099,
            transport: TransportSecurity::Plain,
            io_timeout_secs: Some(30),
        }
    }
}

impl TargetConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn io_timeout(&self) -> Option<Duration> {
        self.io_timeout_secs.map(Duration::from_secs)
    }
}

/// Global configuration loaded from `~/.config/masterlink/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Name the master is bound under in the registry.
    pub registry_name: String,
    pub target: TargetConfig,
    /// Per-call retry policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    /// Connector acquisition retry policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub connect_retry: Option<RetryConfig>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            registry_name: "MasterServer".to_string(),
            target: TargetConfig::default(),
            retry: None,
            connect_retry: None,
        }
    }
}

impl LinkConfig {
    /// Validated settings for connectors and factories.
    pub fn settings(&self) -> Result<LinkSettings, LinkError> {
        let call_policy = self.retry.clone().unwrap_or_default().to_policy()?;
        let connect_policy = self.connect_retry.clone().unwrap_or_default().to_policy()?;
        Ok(LinkSettings {
            registry_name: self.registry_name.clone(),
            call_policy,
            connect_policy,
        })
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("masterlink")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<LinkConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = LinkConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    load_from(&path)
}

/// Load configuration from a specific file.
pub fn load_from(path: &Path) -> Result<LinkConfig> {
    let data = fs::read_to_string(path)?;
    let cfg: LinkConfig = toml::from_str(&data)?;
    Ok(cfg)
}

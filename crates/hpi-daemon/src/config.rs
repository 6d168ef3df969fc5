//! Configuration loading and validation

use anyhow::{bail, Result};
use hpi_core::DomainConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default, rename = "domain")]
    pub domains: Vec<DomainConfig>,
    #[serde(default, rename = "handler")]
    pub handlers: Vec<HandlerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Where the UID map is persisted (optional - UIDs reset on restart without it)
    #[serde(default)]
    pub uid_map: Option<PathBuf>,
    /// Handler rescan interval in seconds
    #[serde(default = "default_rescan_interval")]
    pub rescan_interval_secs: u64,
    /// Capacity of the queue between handlers and the dispatcher
    #[serde(default = "default_event_queue_depth")]
    pub event_queue_depth: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            uid_map: None,
            rescan_interval_secs: default_rescan_interval(),
            event_queue_depth: default_event_queue_depth(),
        }
    }
}

fn default_rescan_interval() -> u64 {
    30
}

fn default_event_queue_depth() -> usize {
    256
}

/// A discovery handler bound to one domain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerConfig {
    pub name: String,
    /// Tag of the target domain (first domain when absent)
    #[serde(default)]
    pub domain: Option<String>,
    /// Inventory file describing the simulated hardware
    pub inventory: PathBuf,
}

impl Config {
    /// Domains to create, falling back to a single untagged one
    pub fn domains(&self) -> Vec<DomainConfig> {
        if self.domains.is_empty() {
            vec![DomainConfig::default()]
        } else {
            self.domains.clone()
        }
    }

    fn validate(&self) -> Result<()> {
        let mut tags = HashSet::new();
        for domain in &self.domains {
            if !tags.insert(domain.tag.as_str()) {
                bail!("duplicate domain tag '{}'", domain.tag);
            }
        }
        for handler in &self.handlers {
            if let Some(tag) = &handler.domain {
                if !tags.contains(tag.as_str()) {
                    bail!("handler '{}' targets unknown domain '{}'", handler.name, tag);
                }
            }
        }
        Ok(())
    }

    /// Make relative file paths relative to the config file's directory
    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        if let Some(uid_map) = self.daemon.uid_map.as_mut() {
            resolve(uid_map);
        }
        for handler in &mut self.handlers {
            resolve(&mut handler.inventory);
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.validate()?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        info!(
            path = %path.display(),
            domains = config.domains.len(),
            handlers = config.handlers.len(),
            "Loaded configuration"
        );
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}

//! Configuration module for chainsocks
//!
//! This module provides configuration types, parsing and validation for the
//! gateway: the `[general]` listener/timing table and the `[[chains]]`
//! per-user proxy chain definitions.

mod chains;
mod general;

pub use chains::{HopConfig, ProxyConfig, Strategy, UserChainConfig};
pub use general::GeneralConfig;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Listener, timeout and control-plane settings
    pub general: GeneralConfig,

    /// Per-user proxy chains; empty means a single anonymous direct gateway
    #[serde(default)]
    pub chains: Vec<UserChainConfig>,
}

impl Config {
    /// Validate the whole configuration, returning the first problem found
    pub fn validate(&self) -> Result<()> {
        if let Err(e) = self.general.validate() {
            bail!("general: {}", e);
        }
        chains::validate_chains(&self.chains)
    }
}

/// Load and validate configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read config file: {:?}", path.as_ref()))?;

    parse_config(&content)
}

/// Parse and validate configuration from a TOML string
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "failed to parse configuration")?;
    config.validate()?;
    Ok(config)
}

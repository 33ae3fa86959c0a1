//! Per-user chain configuration
//!
//! Each `[[chains]]` entry binds one gateway user to an ordered list of
//! hops. A hop is written either inline as a single proxy or as a pool of
//! proxies with a selection strategy; normalization turns the inline form
//! into a one-element pool.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Proxy selection strategy within a pooled hop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Rotate through the pool, one step per selection
    #[default]
    Rr,
    /// Uniformly shuffle the pool on every selection
    Random,
    /// Highest priority class first, round-robin inside a class
    Priority,
}

/// One upstream SOCKS5 proxy endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Display label, may be empty
    #[serde(default)]
    pub name: String,

    /// Hostname or literal IP address
    pub host: String,

    /// TCP port
    pub port: u16,

    /// Username for the hop's username/password sub-negotiation
    #[serde(default)]
    pub username: Option<String>,

    /// Password for the hop's username/password sub-negotiation
    #[serde(default)]
    pub password: Option<String>,

    /// Priority class; higher is preferred under the priority strategy
    #[serde(default)]
    pub priority: i32,
}

/// One position in a user's chain
///
/// Written either as a pool (`strategy` + `proxies`) or inline as a single
/// proxy (`host`/`port` and friends at the hop level).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HopConfig {
    /// Selection strategy for pooled hops
    #[serde(default)]
    pub strategy: Strategy,

    /// Proxy pool; empty when the hop is written inline
    #[serde(default)]
    pub proxies: Vec<ProxyConfig>,

    /// Inline form: display label
    #[serde(default)]
    pub name: String,

    /// Inline form: username
    #[serde(default)]
    pub username: Option<String>,

    /// Inline form: password
    #[serde(default)]
    pub password: Option<String>,

    /// Inline form: hostname or literal IP address
    #[serde(default)]
    pub host: Option<String>,

    /// Inline form: TCP port
    #[serde(default)]
    pub port: Option<u16>,
}

impl HopConfig {
    /// The hop's proxy pool after normalization.
    ///
    /// An inline hop becomes a one-element pool; a pooled hop is returned
    /// as written.
    pub fn normalized_proxies(&self) -> Vec<ProxyConfig> {
        if !self.proxies.is_empty() {
            return self.proxies.clone();
        }
        match (&self.host, self.port) {
            (Some(host), Some(port)) => vec![ProxyConfig {
                name: self.name.clone(),
                host: host.clone(),
                port,
                username: self.username.clone(),
                password: self.password.clone(),
                priority: 0,
            }],
            _ => Vec::new(),
        }
    }
}

/// One gateway user and the chain their traffic is forwarded through
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserChainConfig {
    /// Login username, unique across the configuration
    pub username: String,

    /// Login password
    pub password: String,

    /// Ordered hops; empty means direct connect
    #[serde(default)]
    pub chain: Vec<HopConfig>,
}

fn validate_proxy(path: &str, proxy: &ProxyConfig) -> Result<()> {
    if proxy.host.is_empty() {
        bail!("{}: host is required", path);
    }
    if proxy.port == 0 {
        bail!("{}: port must be between 1 and 65535", path);
    }
    if let Some(username) = &proxy.username {
        if username.len() > 255 {
            bail!("{}: username exceeds 255 bytes", path);
        }
    }
    if let Some(password) = &proxy.password {
        if password.len() > 255 {
            bail!("{}: password exceeds 255 bytes", path);
        }
    }
    Ok(())
}

/// Validate every user chain, including username uniqueness
pub(super) fn validate_chains(chains: &[UserChainConfig]) -> Result<()> {
    let mut seen = HashSet::with_capacity(chains.len());
    for (ci, user) in chains.iter().enumerate() {
        if user.username.is_empty() {
            bail!("chains[{}]: username is required", ci);
        }
        if user.username.len() > 255 {
            bail!("chains[{}]: username exceeds 255 bytes", ci);
        }
        if user.password.is_empty() {
            bail!("chains[{}]: password is required", ci);
        }
        if user.password.len() > 255 {
            bail!("chains[{}]: password exceeds 255 bytes", ci);
        }
        if !seen.insert(user.username.as_str()) {
            bail!("chains[{}]: duplicate username {:?}", ci, user.username);
        }
        for (hi, hop) in user.chain.iter().enumerate() {
            if !hop.proxies.is_empty() {
                for (pi, proxy) in hop.proxies.iter().enumerate() {
                    let path = format!("chains[{}].chain[{}].proxies[{}]", ci, hi, pi);
                    validate_proxy(&path, proxy)?;
                }
            } else {
                let path = format!("chains[{}].chain[{}]", ci, hi);
                match (&hop.host, hop.port) {
                    (Some(host), Some(port)) => {
                        let inline = ProxyConfig {
                            name: hop.name.clone(),
                            host: host.clone(),
                            port,
                            username: hop.username.clone(),
                            password: hop.password.clone(),
                            priority: 0,
                        };
                        validate_proxy(&path, &inline)?;
                    }
                    (None, _) => bail!("{}: host is required", path),
                    (_, None) => bail!("{}: port is required", path),
                }
            }
        }
    }
    Ok(())
}

//! General gateway configuration
//!
//! The `[general]` table: listener address, admission limit, per-step and
//! idle deadlines, and the control-plane intervals. Durations are plain
//! integer seconds.

use serde::{Deserialize, Serialize};

fn default_max_connections() -> usize {
    256
}

fn default_io_timeout() -> u64 {
    30
}

fn default_idle_timeout() -> u64 {
    300
}

fn default_health_check_interval() -> u64 {
    30
}

fn default_health_check_timeout() -> u64 {
    5
}

fn default_health_check_concurrency() -> usize {
    10
}

fn default_chain_cleanup_interval() -> u64 {
    600
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Listener, timeout and control-plane settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GeneralConfig {
    /// Address to listen on (e.g. "0.0.0.0")
    pub bind: String,

    /// Port to listen on
    pub port: u16,

    /// Maximum concurrent inbound sessions; excess accepts are closed
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Per-step protocol deadline in seconds
    #[serde(default = "default_io_timeout")]
    pub io_timeout: u64,

    /// Relay inactivity limit in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: u64,

    /// Seconds between health probe rounds
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval: u64,

    /// Deadline for a single health probe in seconds
    #[serde(default = "default_health_check_timeout")]
    pub health_check_timeout: u64,

    /// Maximum health probes in flight at once
    #[serde(default = "default_health_check_concurrency")]
    pub health_check_concurrency: usize,

    /// Seconds between combo-cache sweeps, doubling as the entry TTL.
    /// Zero disables the expirer.
    #[serde(default = "default_chain_cleanup_interval")]
    pub chain_cleanup_interval: u64,

    /// Seconds between configuration reloads. Zero disables hot reload.
    #[serde(default)]
    pub config_reload_interval: u64,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit JSON log lines instead of text
    #[serde(default)]
    pub json_log: bool,
}

impl GeneralConfig {
    /// The `host:port` string the listener binds to
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    /// Validate the general section
    pub fn validate(&self) -> Result<(), String> {
        if self.bind.is_empty() {
            return Err("bind is required".to_string());
        }
        if self.port == 0 {
            return Err("port must be between 1 and 65535".to_string());
        }
        if self.max_connections == 0 {
            return Err("max_connections must be positive".to_string());
        }
        if self.io_timeout == 0 {
            return Err("io_timeout must be positive".to_string());
        }
        if self.idle_timeout == 0 {
            return Err("idle_timeout must be positive".to_string());
        }
        if self.health_check_interval == 0 {
            return Err("health_check_interval must be positive".to_string());
        }
        if self.health_check_timeout == 0 {
            return Err("health_check_timeout must be positive".to_string());
        }
        if self.health_check_concurrency == 0 {
            return Err("health_check_concurrency must be positive".to_string());
        }
        Ok(())
    }
}

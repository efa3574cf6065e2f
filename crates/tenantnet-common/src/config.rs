//! Process-wide configuration
//!
//! Loaded once by the composition root. The reconciler reads the CIDR/gateway
//! template, the plugin registry reads the backend name and integration bridge.

use crate::error::{ConfigError, ConfigResult};
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

/// Default location of the config file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/tenantnet/config.json";

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "TENANTNET_";

/// tenantnet configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TenantNetConfig {
    /// Shared switch-fabric integration bridge
    pub integration_bridge: String,
    /// CIDR used for the system network and every tenant network
    pub default_cidr: String,
    /// Gateway used alongside `default_cidr`
    pub default_gateway: String,
    /// Interface provisioner backend
    pub plugin: String,
    /// Deadline for every external command
    pub command_timeout_secs: u64,
    /// How many times the event dispatcher redelivers a failed event
    pub max_redeliveries: u32,
}

impl Default for TenantNetConfig {
    fn default() -> Self {
        Self {
            integration_bridge: "br-int".into(),
            default_cidr: "10.244.0.0/16".into(),
            default_gateway: "10.244.0.1".into(),
            plugin: "ovs".into(),
            command_timeout_secs: 30,
            max_redeliveries: 5,
        }
    }
}

impl TenantNetConfig {
    /// Load from a JSON file
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Load from a JSON file, using defaults if the file does not exist.
    ///
    /// A file that exists but does not parse is still an error.
    pub fn load_or_default(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        match Self::load(path) {
            Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("Config {} not found, using defaults", path.display());
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Apply `TENANTNET_*` overrides from the process environment
    pub fn apply_env(&mut self) -> ConfigResult<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(v) = var("INTEGRATION_BRIDGE") {
            self.integration_bridge = v;
        }
        if let Some(v) = var("DEFAULT_CIDR") {
            self.default_cidr = v;
        }
        if let Some(v) = var("DEFAULT_GATEWAY") {
            self.default_gateway = v;
        }
        if let Some(v) = var("PLUGIN") {
            self.plugin = v;
        }
        if let Some(v) = var("COMMAND_TIMEOUT_SECS") {
            self.command_timeout_secs = v.parse().map_err(|e| {
                ConfigError::invalid("command_timeout_secs", format!("{}: {}", v, e))
            })?;
        }
        if let Some(v) = var("MAX_REDELIVERIES") {
            self.max_redeliveries = v
                .parse()
                .map_err(|e| ConfigError::invalid("max_redeliveries", format!("{}: {}", v, e)))?;
        }
        Ok(())
    }

    /// Validate field values
    pub fn validate(&self) -> ConfigResult<()> {
        if self.integration_bridge.trim().is_empty() {
            return Err(ConfigError::invalid("integration_bridge", "must not be empty"));
        }
        if self.plugin.trim().is_empty() {
            return Err(ConfigError::invalid("plugin", "must not be empty"));
        }
        if self.command_timeout_secs == 0 {
            return Err(ConfigError::invalid("command_timeout_secs", "must be positive"));
        }

        let cidr = self.cidr()?;
        let gateway = self.gateway()?;
        if !cidr.contains(gateway) {
            return Err(ConfigError::invalid(
                "default_gateway",
                format!("{} is outside {}", gateway, cidr),
            ));
        }
        Ok(())
    }

    /// Parsed default CIDR
    pub fn cidr(&self) -> ConfigResult<IpNetwork> {
        self.default_cidr
            .parse()
            .map_err(|e| {
                ConfigError::invalid("default_cidr", format!("{}: {}", self.default_cidr, e))
            })
    }

    /// Parsed default gateway
    pub fn gateway(&self) -> ConfigResult<IpAddr> {
        self.default_gateway
            .parse()
            .map_err(|e| {
                ConfigError::invalid(
                    "default_gateway",
                    format!("{}: {}", self.default_gateway, e),
                )
            })
    }

    /// Deadline for a single external command
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

//! Plugin registry
//!
//! Maps backend names to factories. Built once at startup and owned by the
//! agent.

use crate::error::{PluginError, PluginResult};
use crate::ovs::{self, OvsPlugin};
use crate::plugin::{NetworkPlugin, PluginEnv};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info};

/// Builds an uninitialized plugin from the shared environment
pub type PluginFactory =
    Box<dyn Fn(&PluginEnv) -> PluginResult<Box<dyn NetworkPlugin>> + Send + Sync>;

pub struct PluginRegistry {
    factories: DashMap<String, PluginFactory>,
}

impl PluginRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            factories: DashMap::new(),
        }
    }

    /// Registry with every built-in backend
    pub fn with_builtin() -> PluginResult<Self> {
        let registry = Self::new();
        registry.register(
            ovs::PLUGIN_NAME,
            Box::new(|env: &PluginEnv| Ok(Box::new(OvsPlugin::new(env)) as Box<dyn NetworkPlugin>)),
        )?;
        Ok(registry)
    }

    /// Register a factory. Names are unique.
    pub fn register(&self, name: &str, factory: PluginFactory) -> PluginResult<()> {
        match self.factories.entry(name.to_string()) {
            Entry::Occupied(_) => Err(PluginError::DuplicatePlugin(name.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(factory);
                debug!("Registered network plugin {}", name);
                Ok(())
            }
        }
    }

    /// Build and initialize the named plugin
    pub fn resolve(&self, name: &str, env: &PluginEnv) -> PluginResult<Box<dyn NetworkPlugin>> {
        let mut plugin = {
            let factory = self
                .factories
                .get(name)
                .ok_or_else(|| PluginError::UnknownPlugin(name.to_string()))?;
            factory.value()(env)?
        };
        plugin.init(&env.integration_bridge)?;
        info!(
            "Network plugin {} ready on {}",
            plugin.name(),
            env.integration_bridge
        );
        Ok(plugin)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

//! Subcommand implementations

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tenantnet_common::TenantNetConfig;
use tenantnet_controller::{
    DispatchStats, EventDispatcher, InMemoryCrdStore, InMemoryRoleBindingApplier, Namespace,
    NamespaceEvent, Network, RoleBinding, Tenant, TenantNetworkController,
};
use tenantnet_plugins::{
    AttachManager, AttachRequest, Interface, PluginEnv, PluginRegistry, Port,
};
use tokio::sync::mpsc;
use tracing::info;

/// Build the configured backend. Registry problems are fatal.
///
/// Each invocation gets its own manager, so per-port serialization only spans
/// one process. Callers running several `tenantnet setup`/`teardown`
/// processes must serialize them per port id themselves.
fn attach_manager(config: &TenantNetConfig) -> anyhow::Result<AttachManager> {
    let registry = PluginRegistry::with_builtin()?;
    let env = PluginEnv::host(config);
    let plugin = registry.resolve(&config.plugin, &env)?;
    Ok(AttachManager::new(plugin))
}

#[derive(Debug, Serialize)]
pub struct SetupOutput {
    pub fabric: Interface,
    pub sandbox: Interface,
}

pub async fn setup(config: &TenantNetConfig, req: &AttachRequest) -> anyhow::Result<SetupOutput> {
    let manager = attach_manager(config)?;
    let (fabric, sandbox) = manager.attach(req).await?;
    Ok(SetupOutput { fabric, sandbox })
}

pub async fn teardown(
    config: &TenantNetConfig,
    pod_name: &str,
    sandbox_id: &str,
    port: &Port,
) -> anyhow::Result<()> {
    let manager = attach_manager(config)?;
    manager.detach(pod_name, sandbox_id, port).await;
    Ok(())
}

pub fn plugins() -> anyhow::Result<Vec<String>> {
    Ok(PluginRegistry::with_builtin()?.names())
}

/// Resulting state of a dry-run reconcile
#[derive(Debug, Serialize)]
pub struct Plan {
    pub tenants: Vec<Tenant>,
    pub networks: Vec<Network>,
    pub bindings: Vec<RoleBinding>,
    pub stats: DispatchStats,
}

/// Feed `Added` events for `namespaces` through the dispatcher over in-memory backends
pub async fn plan(config: &TenantNetConfig, namespaces: &[String]) -> anyhow::Result<Plan> {
    let store = Arc::new(InMemoryCrdStore::new());
    let applier = Arc::new(InMemoryRoleBindingApplier::new());
    let controller = Arc::new(TenantNetworkController::from_config(
        store.clone(),
        applier.clone(),
        config,
    ));
    let dispatcher = EventDispatcher::new(controller, config.max_redeliveries)
        .with_redelivery_delay(Duration::ZERO);

    let (tx, rx) = mpsc::channel(namespaces.len().max(1));
    let feeder = {
        let namespaces = namespaces.to_vec();
        tokio::spawn(async move {
            for name in namespaces {
                if tx.send(NamespaceEvent::Added(Namespace::new(&name))).await.is_err() {
                    break;
                }
            }
        })
    };
    let stats = dispatcher.run(rx).await;
    feeder.await?;
    info!(
        "Planned {} namespaces: {} processed, {} dropped",
        namespaces.len(),
        stats.processed,
        stats.dropped
    );

    let mut tenants: Vec<Tenant> = store.tenants().into_values().collect();
    tenants.sort_by(|a, b| a.name().cmp(b.name()));
    let mut networks: Vec<Network> = store.networks().into_values().collect();
    networks.sort_by(|a, b| a.name().cmp(b.name()));

    Ok(Plan {
        tenants,
        networks,
        bindings: applier.all(),
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_plan_fresh_namespace() {
        let config = TenantNetConfig::default();

        let plan = plan(&config, &names(&["test"])).await.unwrap();

        let tenants: Vec<&str> = plan.tenants.iter().map(|t| t.name()).collect();
        assert_eq!(tenants, vec!["default"]);
        let networks: Vec<&str> = plan.networks.iter().map(|n| n.name()).collect();
        assert_eq!(networks, vec!["default", "test"]);
        let bindings: Vec<&str> = plan.bindings.iter().map(|b| b.name()).collect();
        assert_eq!(bindings, vec!["test-rolebinding", "test-rolebinding-sa"]);
        assert_eq!(plan.stats.processed, 1);
        assert_eq!(plan.stats.dropped, 0);
    }

    #[tokio::test]
    async fn test_plan_reserved_and_repeated() {
        let config = TenantNetConfig::default();

        let plan = plan(&config, &names(&["kube-system", "team-a", "team-a"]))
            .await
            .unwrap();

        let networks: Vec<&str> = plan.networks.iter().map(|n| n.name()).collect();
        assert_eq!(networks, vec!["default", "team-a"]);
        // Reserved namespaces still get bindings
        assert_eq!(plan.bindings.len(), 4);
        assert_eq!(plan.stats.processed, 3);
    }

    #[test]
    fn test_builtin_plugins() {
        assert_eq!(plugins().unwrap(), vec!["ovs"]);
    }

    #[test]
    fn test_attach_manager_is_per_invocation() {
        let config = TenantNetConfig::default();

        let first = attach_manager(&config).unwrap();
        let second = attach_manager(&config).unwrap();

        assert_eq!(first.plugin_name(), "ovs");
        assert_eq!(second.plugin_name(), "ovs");
        // No lock state is carried over between managers
        assert_eq!(first.active_ports(), 0);
        assert_eq!(second.active_ports(), 0);
    }

    #[test]
    fn test_unknown_configured_plugin_is_fatal() {
        let config = TenantNetConfig {
            plugin: "linuxbridge".into(),
            ..TenantNetConfig::default()
        };
        let err = attach_manager(&config).err().unwrap();
        assert!(err.to_string().contains("linuxbridge"));
    }
}

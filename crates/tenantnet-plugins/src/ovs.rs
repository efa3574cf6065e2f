//! Open vSwitch backend
//!
//! Each workload gets a local bridge between the integration bridge and its
//! sandbox:
//!
//! ```text
//!   br-int ── qvo ═══ qvb ── qbr ── tap ═══ vif (renamed, inside sandbox)
//! ```
//!
//! Setup runs in two phases (fabric side, then sandbox side). A failure at any
//! step tears the whole port down before the error is returned.

use crate::error::{PluginError, PluginResult};
use crate::naming::DeviceNames;
use crate::netadmin::{FabricPortMeta, NetAdmin};
use crate::netns::NetnsResolver;
use crate::plugin::{Interface, NetworkPlugin, Port, PluginEnv};
use async_trait::async_trait;
use ipnetwork::IpNetwork;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Registry name
pub const PLUGIN_NAME: &str = "ovs";

/// Open vSwitch interface provisioner
pub struct OvsPlugin {
    integration_bridge: String,
    net: NetAdmin,
    resolver: Arc<dyn NetnsResolver>,
}

impl OvsPlugin {
    pub fn new(env: &PluginEnv) -> Self {
        Self {
            integration_bridge: env.integration_bridge.clone(),
            net: NetAdmin::new(env.runner.clone()),
            resolver: env.resolver.clone(),
        }
    }

    pub fn integration_bridge(&self) -> &str {
        &self.integration_bridge
    }

    /// Phase A: veth pair into the local bridge and onto the integration bridge
    async fn setup_ovs_interface(
        &self,
        pod_name: &str,
        port: &Port,
        names: &DeviceNames,
    ) -> PluginResult<Interface> {
        self.net
            .add_veth_pair(&names.veth_bridge, &names.veth_fabric)
            .await?;
        if !self.net.ensure_bridge(&names.bridge).await? {
            debug!("Reusing bridge {}", names.bridge);
        }
        self.net.set_link_up(&names.veth_bridge).await?;
        self.net.set_link_up(&names.veth_fabric).await?;
        self.net.set_link_up(&names.bridge).await?;
        self.net
            .bridge_add_if(&names.bridge, &names.veth_bridge)
            .await?;

        let meta = FabricPortMeta {
            mac_address: &port.mac_address,
            port_id: &port.id,
            workload: pod_name,
        };
        self.net
            .fabric_add_port(&self.integration_bridge, &names.veth_fabric, &meta)
            .await?;

        let mac = self.net.link_mac(&names.bridge).await?;
        Ok(Interface {
            name: names.bridge.clone(),
            mac: Some(mac),
            sandbox: None,
        })
    }

    /// Phase B: tap pair from the local bridge into the sandbox namespace
    async fn setup_sandbox_interface(
        &self,
        sandbox_id: &str,
        port: &Port,
        names: &DeviceNames,
        ip_cidr: IpNetwork,
        gateway: IpAddr,
        if_name: &str,
    ) -> PluginResult<Interface> {
        self.net.add_veth_pair(&names.tap, &names.vif).await?;
        self.net.bridge_add_if(&names.bridge, &names.tap).await?;
        self.net
            .set_link_address(&names.vif, &port.mac_address)
            .await?;

        let netns = self.resolver.resolve(sandbox_id).await?;
        self.net.expose_netns(&netns).await?;
        self.net.move_to_netns(&names.vif, &netns).await?;

        self.net.netns_set_link_down(&netns, &names.vif).await?;
        self.net
            .netns_rename_link(&netns, &names.vif, if_name)
            .await?;
        self.net.netns_set_link_up(&netns, if_name).await?;
        self.net.netns_add_address(&netns, if_name, ip_cidr).await?;
        self.net.netns_add_default_route(&netns, gateway).await?;

        self.net.set_link_up(&names.tap).await?;

        if let Err(e) = self.net.remove_netns_handle(&netns).await {
            debug!("Removing netns handle {} failed: {}", netns, e);
        }

        Ok(Interface {
            name: if_name.to_string(),
            mac: Some(port.mac_address.clone()),
            sandbox: Some(format!("/proc/{}/ns/net", netns)),
        })
    }

    async fn attach(
        &self,
        pod_name: &str,
        sandbox_id: &str,
        port: &Port,
        ip_cidr: IpNetwork,
        gateway: IpAddr,
        if_name: &str,
    ) -> PluginResult<(Interface, Interface)> {
        let names = DeviceNames::for_port(&port.id);
        let fabric = self.setup_ovs_interface(pod_name, port, &names).await?;
        let sandbox = self
            .setup_sandbox_interface(sandbox_id, port, &names, ip_cidr, gateway, if_name)
            .await?;
        Ok((fabric, sandbox))
    }

    async fn destroy_ovs_interface(&self, names: &DeviceNames) {
        let fabric = &names.veth_fabric;
        ignore("ovs del-port", fabric, self.net.fabric_del_port(fabric).await);
        ignore("set link down", fabric, self.net.set_link_down(fabric).await);
        ignore("delete link", fabric, self.net.delete_link(fabric).await);

        let bridge = &names.bridge;
        ignore("set bridge down", bridge, self.net.set_link_down(bridge).await);
        ignore("delete bridge", bridge, self.net.delete_bridge(bridge).await);
    }

    async fn destroy_sandbox_interface(&self, sandbox_id: &str, names: &DeviceNames) {
        if let Err(e) = self.net.delete_link(&names.tap).await {
            debug!("Deleting {} failed: {}", names.tap, e);
        }

        match self.resolver.resolve(sandbox_id).await {
            Ok(netns) => {
                if let Err(e) = self.net.remove_netns_handle(&netns).await {
                    debug!("Removing netns handle {} failed: {}", netns, e);
                }
            }
            Err(e) => debug!("Resolving sandbox {} failed: {}", sandbox_id, e),
        }
    }
}

fn ignore(step: &str, dev: &str, result: PluginResult<()>) {
    if let Err(e) = result {
        warn!("Teardown: {} {} failed: {}", step, dev, e);
    }
}

#[async_trait]
impl NetworkPlugin for OvsPlugin {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn init(&mut self, integration_bridge: &str) -> PluginResult<()> {
        if integration_bridge.trim().is_empty() {
            return Err(PluginError::Config(
                "integration bridge must not be empty".into(),
            ));
        }
        self.integration_bridge = integration_bridge.to_string();
        Ok(())
    }

    async fn setup_interface(
        &self,
        pod_name: &str,
        sandbox_id: &str,
        port: &Port,
        ip_cidr: IpNetwork,
        gateway: IpAddr,
        if_name: &str,
    ) -> PluginResult<(Interface, Interface)> {
        match self
            .attach(pod_name, sandbox_id, port, ip_cidr, gateway, if_name)
            .await
        {
            Ok(interfaces) => {
                info!("Setup interface for {} (port {}) done", pod_name, port.id);
                Ok(interfaces)
            }
            Err(e) => {
                warn!(
                    "Setup interface for {} (port {}) failed: {}, rolling back",
                    pod_name, port.id, e
                );
                self.destroy_interface(pod_name, sandbox_id, port).await;
                Err(e)
            }
        }
    }

    async fn destroy_interface(&self, pod_name: &str, sandbox_id: &str, port: &Port) {
        let names = DeviceNames::for_port(&port.id);
        self.destroy_ovs_interface(&names).await;
        self.destroy_sandbox_interface(sandbox_id, &names).await;
        info!("Destroy interface for {} (port {}) done", pod_name, port.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::MockCommandRunner;
    use crate::error::CommandError;
    use crate::netns::DockerNetnsResolver;
    use std::time::Duration;

    const PORT_ID: &str = "4f5d2c1a-9b8e-4c7d-a6f5-e4d3c2b1a098";
    const PORT_MAC: &str = "fa:16:3e:4b:7c:01";
    const BRIDGE_MAC: &str = "9a:3c:5e:01:ab:cd";

    fn port() -> Port {
        Port {
            id: PORT_ID.into(),
            mac_address: PORT_MAC.into(),
        }
    }

    fn plugin() -> (OvsPlugin, Arc<MockCommandRunner>) {
        let mock = Arc::new(MockCommandRunner::new());
        mock.respond(
            "ip link show",
            &[
                "7: qbr4f5d2c1a-9b: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500",
                &format!("    link/ether {} brd ff:ff:ff:ff:ff:ff", BRIDGE_MAC),
            ],
        );
        mock.respond("docker inspect", &["'4242'"]);

        let resolver = Arc::new(DockerNetnsResolver::new(mock.clone()));
        let env = PluginEnv::new(mock.clone(), resolver, "br-int");
        (OvsPlugin::new(&env), mock)
    }

    async fn setup(plugin: &OvsPlugin) -> PluginResult<(Interface, Interface)> {
        plugin
            .setup_interface(
                "web-0",
                "c0ffee",
                &port(),
                "10.244.1.5/16".parse().unwrap(),
                "10.244.0.1".parse().unwrap(),
                "eth0",
            )
            .await
    }

    fn teardown_calls() -> Vec<&'static str> {
        vec![
            "ovs-vsctl -vconsole:off --if-exists del-port qvo4f5d2c1a-9b",
            "ip link set dev qvo4f5d2c1a-9b down",
            "ip link delete dev qvo4f5d2c1a-9b",
            "ip link set dev qbr4f5d2c1a-9b down",
            "brctl delbr qbr4f5d2c1a-9b",
            "ip link delete dev tap4f5d2c1a-9b",
            "docker inspect -f {{.State.Pid}} c0ffee",
            "rm -f /var/run/netns/4242",
        ]
    }

    #[tokio::test]
    async fn test_setup_interface() {
        let (plugin, mock) = plugin();

        let (fabric, sandbox) = setup(&plugin).await.unwrap();

        assert_eq!(fabric.name, "qbr4f5d2c1a-9b");
        assert_eq!(fabric.mac.as_deref(), Some(BRIDGE_MAC));
        assert_eq!(sandbox.name, "eth0");
        assert_eq!(sandbox.mac.as_deref(), Some(PORT_MAC));
        assert_eq!(sandbox.sandbox.as_deref(), Some("/proc/4242/ns/net"));

        assert_eq!(
            mock.calls(),
            vec![
                // Phase A
                "ip link add qvb4f5d2c1a-9b type veth peer name qvo4f5d2c1a-9b".to_string(),
                "brctl addbr qbr4f5d2c1a-9b".to_string(),
                "ip link set dev qvb4f5d2c1a-9b up".to_string(),
                "ip link set dev qvo4f5d2c1a-9b up".to_string(),
                "ip link set dev qbr4f5d2c1a-9b up".to_string(),
                "brctl addif qbr4f5d2c1a-9b qvb4f5d2c1a-9b".to_string(),
                format!(
                    "ovs-vsctl -vconsole:off -- --if-exists del-port qvo4f5d2c1a-9b \
                     -- add-port br-int qvo4f5d2c1a-9b \
                     -- set Interface qvo4f5d2c1a-9b external_ids:attached-mac={} \
                     external_ids:iface-id={} external_ids:vm-id=web-0 \
                     external_ids:iface-status=active",
                    PORT_MAC, PORT_ID
                ),
                "ip link show qbr4f5d2c1a-9b".to_string(),
                // Phase B
                "ip link add tap4f5d2c1a-9b type veth peer name vif4f5d2c1a-9b".to_string(),
                "brctl addif qbr4f5d2c1a-9b tap4f5d2c1a-9b".to_string(),
                format!("ip link set dev vif4f5d2c1a-9b address {}", PORT_MAC),
                "docker inspect -f {{.State.Pid}} c0ffee".to_string(),
                "ln -sf /proc/4242/ns/net /var/run/netns/4242".to_string(),
                "ip link set dev vif4f5d2c1a-9b netns 4242".to_string(),
                "ip netns exec 4242 ip link set dev vif4f5d2c1a-9b down".to_string(),
                "ip netns exec 4242 ip link set dev vif4f5d2c1a-9b name eth0".to_string(),
                "ip netns exec 4242 ip link set dev eth0 up".to_string(),
                "ip netns exec 4242 ip addr add dev eth0 10.244.1.5/16".to_string(),
                "ip netns exec 4242 ip route add default via 10.244.0.1".to_string(),
                "ip link set dev tap4f5d2c1a-9b up".to_string(),
                "rm -f /var/run/netns/4242".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_setup_survives_netns_handle_cleanup_failure() {
        let (plugin, mock) = plugin();
        mock.fail_on("rm -f");

        assert!(setup(&plugin).await.is_ok());
        assert!(!mock.calls().iter().any(|c| c.starts_with("brctl delbr")));
    }

    #[tokio::test]
    async fn test_setup_reuses_existing_bridge() {
        let (plugin, mock) = plugin();
        mock.fail_on_with(
            "brctl addbr",
            &["device qbr4f5d2c1a-9b already exists; can't create bridge with the same name"],
        );

        assert!(setup(&plugin).await.is_ok());
        assert!(!mock.calls().iter().any(|c| c.starts_with("brctl delbr")));
    }

    #[tokio::test]
    async fn test_rollback_on_every_step() {
        // Every command before the final best-effort handle removal is a setup step
        let steps = {
            let (plugin, mock) = plugin();
            setup(&plugin).await.unwrap();
            mock.call_count() - 1
        };
        assert_eq!(steps, 20);

        for step in 0..steps {
            let (plugin, mock) = plugin();
            mock.fail_call(step);

            let err = setup(&plugin).await.unwrap_err();

            let calls = mock.calls();
            let failed = &calls[step];
            match &err {
                PluginError::Command(e) => assert_eq!(e.command(), failed, "step {}", step),
                other => panic!("step {}: unexpected error {}", step, other),
            }

            // Setup stopped at the failing step and teardown ran in full afterwards
            let expected = teardown_calls();
            assert_eq!(calls.len(), step + 1 + expected.len(), "step {}", step);
            assert_eq!(&calls[step + 1..], expected.as_slice(), "step {}", step);
        }
    }

    #[tokio::test]
    async fn test_rollback_on_command_timeout() {
        // Fabric port add (Phase A) and default route (Phase B)
        for step in [6, 18] {
            let (plugin, mock) = plugin();
            mock.time_out_call(step, Duration::from_secs(30));

            let err = setup(&plugin).await.unwrap_err();

            let calls = mock.calls();
            match &err {
                PluginError::Command(e @ CommandError::Timeout { timeout, .. }) => {
                    assert_eq!(e.command(), calls[step], "step {}", step);
                    assert_eq!(*timeout, Duration::from_secs(30));
                }
                other => panic!("step {}: expected a timeout, got {}", step, other),
            }
            assert_eq!(&calls[step + 1..], teardown_calls().as_slice(), "step {}", step);
        }
    }

    #[tokio::test]
    async fn test_rollback_on_bad_bridge_mac() {
        let (plugin, mock) = plugin();
        // Takes precedence over the canned response
        mock.fail_on_with("ip link show", &[]);

        assert!(matches!(setup(&plugin).await, Err(PluginError::Command(_))));
        assert!(mock.calls().iter().any(|c| c == "brctl delbr qbr4f5d2c1a-9b"));
    }

    #[tokio::test]
    async fn test_rollback_error_not_masked_by_teardown_failures() {
        let (plugin, mock) = plugin();
        mock.fail_on("ip netns exec 4242 ip route");
        mock.fail_on("ovs-vsctl -vconsole:off --if-exists");
        mock.fail_on("brctl delbr");
        mock.fail_on("ip link delete");

        let err = setup(&plugin).await.unwrap_err();

        match err {
            PluginError::Command(e) => {
                assert_eq!(e.command(), "ip netns exec 4242 ip route add default via 10.244.0.1")
            }
            other => panic!("unexpected error {}", other),
        }
        // Teardown kept going past its own failures
        assert!(mock.calls().iter().any(|c| c == "rm -f /var/run/netns/4242"));
    }

    #[tokio::test]
    async fn test_destroy_interface_is_idempotent() {
        let (plugin, mock) = plugin();
        mock.fail_on("ip link");
        mock.fail_on("brctl");
        mock.fail_on("docker");

        plugin.destroy_interface("web-0", "c0ffee", &port()).await;
        let first = mock.calls();
        mock.clear_calls();
        plugin.destroy_interface("web-0", "c0ffee", &port()).await;

        assert_eq!(first, mock.calls());
        // Unresolvable sandbox skips handle removal only
        assert_eq!(first.len(), teardown_calls().len() - 1);
    }

    #[tokio::test]
    async fn test_teardown_uses_port_id_only() {
        let (plugin, mock) = plugin();

        plugin.destroy_interface("other-pod", "c0ffee", &port()).await;

        assert_eq!(mock.calls(), teardown_calls());
    }

    #[test]
    fn test_init() {
        let (mut plugin, _) = plugin();
        assert_eq!(plugin.name(), "ovs");

        plugin.init("br-fabric").unwrap();
        assert_eq!(plugin.integration_bridge(), "br-fabric");

        let err = plugin.init("  ").unwrap_err();
        assert!(err.is_fatal());
    }
}

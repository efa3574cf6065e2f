//! Network Administration
//!
//! Typed link, bridge, namespace, address, route and switch-fabric operations
//! over a [`CommandRunner`].

use crate::command::{command_line, CommandRunner};
use crate::error::{PluginError, PluginResult};
use ipnetwork::IpNetwork;
use std::net::IpAddr;
use std::sync::Arc;

/// Directory `ip netns` looks up named namespaces in
pub const NETNS_RUN_DIR: &str = "/var/run/netns";

/// Metadata recorded on a switch-fabric port for later lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FabricPortMeta<'a> {
    pub mac_address: &'a str,
    pub port_id: &'a str,
    pub workload: &'a str,
}

/// Network administration capability
#[derive(Clone)]
pub struct NetAdmin {
    runner: Arc<dyn CommandRunner>,
}

impl NetAdmin {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    async fn run(&self, program: &str, args: &[&str]) -> PluginResult<Vec<String>> {
        Ok(self.runner.run(program, args).await?)
    }

    async fn ip(&self, args: &[&str]) -> PluginResult<()> {
        self.run("ip", args).await.map(|_| ())
    }

    async fn netns_ip(&self, netns: &str, args: &[&str]) -> PluginResult<()> {
        let mut full = vec!["netns", "exec", netns, "ip"];
        full.extend_from_slice(args);
        self.ip(&full).await
    }

    // =========================================================================
    // Links
    // =========================================================================

    /// Create a veth pair
    pub async fn add_veth_pair(&self, name: &str, peer: &str) -> PluginResult<()> {
        self.ip(&["link", "add", name, "type", "veth", "peer", "name", peer]).await
    }

    pub async fn set_link_up(&self, dev: &str) -> PluginResult<()> {
        self.ip(&["link", "set", "dev", dev, "up"]).await
    }

    pub async fn set_link_down(&self, dev: &str) -> PluginResult<()> {
        self.ip(&["link", "set", "dev", dev, "down"]).await
    }

    pub async fn set_link_address(&self, dev: &str, mac: &str) -> PluginResult<()> {
        self.ip(&["link", "set", "dev", dev, "address", mac]).await
    }

    /// Delete a link. Deleting one end of a veth pair removes its peer.
    pub async fn delete_link(&self, dev: &str) -> PluginResult<()> {
        self.ip(&["link", "delete", "dev", dev]).await
    }

    /// Read back the hardware address of a link
    pub async fn link_mac(&self, dev: &str) -> PluginResult<String> {
        let args = ["link", "show", dev];
        let output = self.run("ip", &args).await?;
        parse_link_mac(&output).ok_or_else(|| PluginError::UnexpectedOutput {
            command: command_line("ip", &args),
            detail: format!("no link/ether address in {:?}", output),
        })
    }

    // =========================================================================
    // Bridges
    // =========================================================================

    /// Create a bridge, reusing one that already exists.
    ///
    /// Returns whether the bridge was newly created.
    pub async fn ensure_bridge(&self, bridge: &str) -> PluginResult<bool> {
        match self.runner.run("brctl", &["addbr", bridge]).await {
            Ok(_) => Ok(true),
            Err(e) if e.output().iter().any(|l| l.contains("already exists")) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn delete_bridge(&self, bridge: &str) -> PluginResult<()> {
        self.run("brctl", &["delbr", bridge]).await.map(|_| ())
    }

    pub async fn bridge_add_if(&self, bridge: &str, dev: &str) -> PluginResult<()> {
        self.run("brctl", &["addif", bridge, dev]).await.map(|_| ())
    }

    // =========================================================================
    // Switch fabric
    // =========================================================================

    /// Attach `dev` to the integration bridge, replacing any stale port
    pub async fn fabric_add_port(
        &self,
        integration_bridge: &str,
        dev: &str,
        meta: &FabricPortMeta<'_>,
    ) -> PluginResult<()> {
        let attached_mac = format!("external_ids:attached-mac={}", meta.mac_address);
        let iface_id = format!("external_ids:iface-id={}", meta.port_id);
        let vm_id = format!("external_ids:vm-id={}", meta.workload);
        self.run(
            "ovs-vsctl",
            &[
                "-vconsole:off",
                "--",
                "--if-exists",
                "del-port",
                dev,
                "--",
                "add-port",
                integration_bridge,
                dev,
                "--",
                "set",
                "Interface",
                dev,
                &attached_mac,
                &iface_id,
                &vm_id,
                "external_ids:iface-status=active",
            ],
        )
        .await
        .map(|_| ())
    }

    pub async fn fabric_del_port(&self, dev: &str) -> PluginResult<()> {
        self.run("ovs-vsctl", &["-vconsole:off", "--if-exists", "del-port", dev])
            .await
            .map(|_| ())
    }

    // =========================================================================
    // Namespaces
    // =========================================================================

    /// Make the namespace of `pid` addressable by `ip netns` under the pid
    pub async fn expose_netns(&self, pid: &str) -> PluginResult<()> {
        let target = format!("/proc/{}/ns/net", pid);
        let link = format!("{}/{}", NETNS_RUN_DIR, pid);
        self.run("ln", &["-sf", &target, &link]).await.map(|_| ())
    }

    pub async fn remove_netns_handle(&self, pid: &str) -> PluginResult<()> {
        let link = format!("{}/{}", NETNS_RUN_DIR, pid);
        self.run("rm", &["-f", &link]).await.map(|_| ())
    }

    pub async fn move_to_netns(&self, dev: &str, netns: &str) -> PluginResult<()> {
        self.ip(&["link", "set", "dev", dev, "netns", netns]).await
    }

    pub async fn netns_set_link_up(&self, netns: &str, dev: &str) -> PluginResult<()> {
        self.netns_ip(netns, &["link", "set", "dev", dev, "up"]).await
    }

    pub async fn netns_set_link_down(&self, netns: &str, dev: &str) -> PluginResult<()> {
        self.netns_ip(netns, &["link", "set", "dev", dev, "down"]).await
    }

    pub async fn netns_rename_link(
        &self,
        netns: &str,
        dev: &str,
        new_name: &str,
    ) -> PluginResult<()> {
        self.netns_ip(netns, &["link", "set", "dev", dev, "name", new_name]).await
    }

    pub async fn netns_add_address(
        &self,
        netns: &str,
        dev: &str,
        addr: IpNetwork,
    ) -> PluginResult<()> {
        let addr = addr.to_string();
        self.netns_ip(netns, &["addr", "add", "dev", dev, &addr]).await
    }

    pub async fn netns_add_default_route(
        &self,
        netns: &str,
        gateway: IpAddr,
    ) -> PluginResult<()> {
        let gateway = gateway.to_string();
        self.netns_ip(netns, &["route", "add", "default", "via", &gateway]).await
    }
}

/// Extract the `link/ether` address from `ip link show` output
pub fn parse_link_mac(output: &[String]) -> Option<String> {
    output.iter().find_map(|line| {
        let mut fields = line.split_whitespace();
        while let Some(field) = fields.next() {
            if field == "link/ether" {
                return fields.next().map(str::to_string);
            }
        }
        None
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::MockCommandRunner;

    fn admin() -> (NetAdmin, Arc<MockCommandRunner>) {
        let mock = Arc::new(MockCommandRunner::new());
        (NetAdmin::new(mock.clone()), mock)
    }

    #[test]
    fn test_parse_link_mac() {
        let output = vec![
            "7: qbr4f5d2c1a-9b: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 qdisc noqueue"
                .to_string(),
            "    link/ether 9a:3c:5e:01:ab:cd brd ff:ff:ff:ff:ff:ff".to_string(),
        ];
        assert_eq!(parse_link_mac(&output).as_deref(), Some("9a:3c:5e:01:ab:cd"));
        assert_eq!(parse_link_mac(&output[..1]), None);
        assert_eq!(parse_link_mac(&[]), None);
    }

    #[tokio::test]
    async fn test_link_mac_unexpected_output() {
        let (admin, mock) = admin();
        mock.respond("ip link show", &["7: qbrx: <BROADCAST>"]);

        let err = admin.link_mac("qbrx").await.unwrap_err();
        assert!(matches!(err, PluginError::UnexpectedOutput { .. }));
    }

    #[tokio::test]
    async fn test_ensure_bridge_reuses_existing() {
        let (admin, mock) = admin();
        mock.fail_on_with(
            "brctl addbr qbr1",
            &["device qbr1 already exists; can't create bridge with the same name"],
        );

        assert!(!admin.ensure_bridge("qbr1").await.unwrap());
        assert!(admin.ensure_bridge("qbr2").await.unwrap());
    }

    #[tokio::test]
    async fn test_ensure_bridge_other_failure() {
        let (admin, mock) = admin();
        mock.fail_on("brctl addbr");
        assert!(matches!(
            admin.ensure_bridge("qbr1").await,
            Err(PluginError::Command(_))
        ));
    }

    #[tokio::test]
    async fn test_netns_commands() {
        let (admin, mock) = admin();

        admin.expose_netns("4242").await.unwrap();
        admin
            .netns_add_address("4242", "eth0", "10.244.1.5/16".parse().unwrap())
            .await
            .unwrap();
        admin
            .netns_add_default_route("4242", "10.244.0.1".parse().unwrap())
            .await
            .unwrap();

        assert_eq!(
            mock.calls(),
            vec![
                "ln -sf /proc/4242/ns/net /var/run/netns/4242",
                "ip netns exec 4242 ip addr add dev eth0 10.244.1.5/16",
                "ip netns exec 4242 ip route add default via 10.244.0.1",
            ]
        );
    }

    #[tokio::test]
    async fn test_fabric_add_port() {
        let (admin, mock) = admin();
        let meta = FabricPortMeta {
            mac_address: "fa:16:3e:00:00:01",
            port_id: "port-1",
            workload: "web-0",
        };

        admin.fabric_add_port("br-int", "qvoport-1", &meta).await.unwrap();

        assert_eq!(
            mock.calls(),
            vec![
                "ovs-vsctl -vconsole:off -- --if-exists del-port qvoport-1 \
                 -- add-port br-int qvoport-1 \
                 -- set Interface qvoport-1 external_ids:attached-mac=fa:16:3e:00:00:01 \
                 external_ids:iface-id=port-1 external_ids:vm-id=web-0 \
                 external_ids:iface-status=active"
            ]
        );
    }
}

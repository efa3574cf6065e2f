//! Interface provisioner contract

use crate::command::{CommandRunner, HostCommandRunner};
use crate::error::PluginResult;
use crate::netns::{DockerNetnsResolver, NetnsResolver};
use async_trait::async_trait;
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;
use tenantnet_common::TenantNetConfig;

/// Logical attachment point of one workload on the switch fabric
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    pub id: String,
    pub mac_address: String,
}

/// Interface produced by a successful setup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    /// Namespace path, set for sandbox-side interfaces
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox: Option<String>,
}

/// Everything needed to attach one workload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachRequest {
    pub pod_name: String,
    pub sandbox_id: String,
    pub port: Port,
    pub ip_cidr: IpNetwork,
    pub gateway: IpAddr,
    pub if_name: String,
}

/// Backend that wires a sandbox into the switch fabric
#[async_trait]
pub trait NetworkPlugin: Send + Sync {
    /// Registry name of the backend
    fn name(&self) -> &str;

    /// Bind the plugin to the integration bridge
    fn init(&mut self, integration_bridge: &str) -> PluginResult<()>;

    /// Attach the sandbox. On error nothing is left behind.
    ///
    /// Returns the fabric-side and sandbox-side interfaces.
    async fn setup_interface(
        &self,
        pod_name: &str,
        sandbox_id: &str,
        port: &Port,
        ip_cidr: IpNetwork,
        gateway: IpAddr,
        if_name: &str,
    ) -> PluginResult<(Interface, Interface)>;

    /// Remove everything setup may have created for `port`. Never fails.
    async fn destroy_interface(&self, pod_name: &str, sandbox_id: &str, port: &Port);
}

/// Collaborators handed to plugin factories
#[derive(Clone)]
pub struct PluginEnv {
    pub runner: Arc<dyn CommandRunner>,
    pub resolver: Arc<dyn NetnsResolver>,
    pub integration_bridge: String,
}

impl PluginEnv {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        resolver: Arc<dyn NetnsResolver>,
        integration_bridge: &str,
    ) -> Self {
        Self {
            runner,
            resolver,
            integration_bridge: integration_bridge.to_string(),
        }
    }

    /// Host runner with the configured deadline, docker namespace resolution
    pub fn host(config: &TenantNetConfig) -> Self {
        let runner: Arc<dyn CommandRunner> =
            Arc::new(HostCommandRunner::new(config.command_timeout()));
        let resolver = Arc::new(DockerNetnsResolver::new(runner.clone()));
        Self::new(runner, resolver, &config.integration_bridge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::MockCommandRunner;
    use crate::ovs::OvsPlugin;

    #[test]
    fn test_attach_request_from_json() {
        let req: AttachRequest = serde_json::from_str(
            r#"{
                "pod_name": "web-0",
                "sandbox_id": "c0ffee",
                "port": {"id": "p1", "mac_address": "fa:16:3e:00:00:01"},
                "ip_cidr": "10.244.1.5/16",
                "gateway": "10.244.0.1",
                "if_name": "eth0"
            }"#,
        )
        .unwrap();

        assert_eq!(req.port.id, "p1");
        assert_eq!(req.ip_cidr.prefix(), 16);
        assert_eq!(req.gateway, "10.244.0.1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_attach_request_rejects_bad_cidr() {
        let result = serde_json::from_str::<AttachRequest>(
            r#"{"pod_name": "web-0", "sandbox_id": "c0ffee",
                "port": {"id": "p1", "mac_address": "fa:16:3e:00:00:01"},
                "ip_cidr": "10.244.1.5/40", "gateway": "10.244.0.1", "if_name": "eth0"}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_interface_json_omits_unset_fields() {
        let fabric = Interface {
            name: "qbrp1".into(),
            mac: None,
            sandbox: None,
        };
        assert_eq!(
            serde_json::to_value(&fabric).unwrap(),
            serde_json::json!({"name": "qbrp1"})
        );

        let sandbox: Interface =
            serde_json::from_str(r#"{"name": "eth0", "sandbox": "/proc/42/ns/net"}"#).unwrap();
        assert_eq!(sandbox.mac, None);
        assert_eq!(sandbox.sandbox.as_deref(), Some("/proc/42/ns/net"));
    }

    #[test]
    fn test_env_feeds_plugin() {
        let runner = Arc::new(MockCommandRunner::new());
        runner.fail_on("docker");
        let resolver = Arc::new(DockerNetnsResolver::new(runner.clone()));
        let env = PluginEnv::new(runner.clone(), resolver, "br-fabric");
        let plugin = OvsPlugin::new(&env);
        let port = Port {
            id: "p1".into(),
            mac_address: "fa:16:3e:00:00:01".into(),
        };

        tokio_test::block_on(plugin.destroy_interface("web-0", "c0ffee", &port));

        let calls = runner.calls();
        assert_eq!(calls[0], "ovs-vsctl -vconsole:off --if-exists del-port qvop1");
        assert_eq!(
            calls.last().map(String::as_str),
            Some("docker inspect -f {{.State.Pid}} c0ffee")
        );
    }
}

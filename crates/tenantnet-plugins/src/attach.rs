//! Attach/detach front door
//!
//! Serializes setup and teardown per port so two requests for the same port
//! never interleave their command sequences. Different ports proceed
//! concurrently.

use crate::error::PluginResult;
use crate::plugin::{AttachRequest, Interface, NetworkPlugin, Port};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

pub struct AttachManager {
    plugin: Box<dyn NetworkPlugin>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl AttachManager {
    pub fn new(plugin: Box<dyn NetworkPlugin>) -> Self {
        Self {
            plugin,
            locks: DashMap::new(),
        }
    }

    pub fn plugin_name(&self) -> &str {
        self.plugin.name()
    }

    /// Wire the sandbox described by `req` into the fabric
    pub async fn attach(&self, req: &AttachRequest) -> PluginResult<(Interface, Interface)> {
        let lock = self.lock_for(&req.port.id);
        let result = {
            let _guard = lock.lock().await;
            debug!("Attaching {} (port {})", req.pod_name, req.port.id);
            self.plugin
                .setup_interface(
                    &req.pod_name,
                    &req.sandbox_id,
                    &req.port,
                    req.ip_cidr,
                    req.gateway,
                    &req.if_name,
                )
                .await
        };
        self.release(&req.port.id, lock);
        result
    }

    /// Remove everything attached for `port`
    pub async fn detach(&self, pod_name: &str, sandbox_id: &str, port: &Port) {
        let lock = self.lock_for(&port.id);
        {
            let _guard = lock.lock().await;
            debug!("Detaching {} (port {})", pod_name, port.id);
            self.plugin.destroy_interface(pod_name, sandbox_id, port).await;
        }
        self.release(&port.id, lock);
    }

    /// Number of ports with an operation in flight or queued
    pub fn active_ports(&self) -> usize {
        self.locks.len()
    }

    fn lock_for(&self, port_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(port_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn release(&self, port_id: &str, lock: Arc<Mutex<()>>) {
        drop(lock);
        // Only the map still holds it: nobody is waiting on this port
        self.locks
            .remove_if(port_id, |_, held| Arc::strong_count(held) == 1);
    }
}

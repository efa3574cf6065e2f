//! Tenant/Network Reconciler
//!
//! One best-effort pass per namespace event. Every step is idempotent on its
//! own, so a redelivered event converges to the same state without duplicates.

use crate::events::NamespaceEvent;
use crate::model::{Namespace, Network, Tenant};
use crate::rbac::{bindings_for_namespace, BindingError, RoleBindingApplier};
use crate::store::{CrdStore, StoreError, StoreResult};
use std::sync::Arc;
use tenantnet_common::{is_reserved_namespace, TenantNetConfig, SYSTEM_NETWORK, SYSTEM_TENANT};
use thiserror::Error;
use tracing::{debug, info};

/// Reconcile errors. The underlying error is kept as-is.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Binding(#[from] BindingError),
}

/// Maps namespaces to tenant networks and access bindings
pub struct TenantNetworkController {
    store: Arc<dyn CrdStore>,
    bindings: Arc<dyn RoleBindingApplier>,
    cidr: String,
    gateway: String,
}

impl TenantNetworkController {
    pub fn new(
        store: Arc<dyn CrdStore>,
        bindings: Arc<dyn RoleBindingApplier>,
        cidr: &str,
        gateway: &str,
    ) -> Self {
        Self {
            store,
            bindings,
            cidr: cidr.to_string(),
            gateway: gateway.to_string(),
        }
    }

    /// Build from the process configuration
    pub fn from_config(
        store: Arc<dyn CrdStore>,
        bindings: Arc<dyn RoleBindingApplier>,
        config: &TenantNetConfig,
    ) -> Self {
        Self::new(store, bindings, &config.default_cidr, &config.default_gateway)
    }

    /// Dispatch one namespace event
    pub async fn handle(&self, event: &NamespaceEvent) -> Result<(), ControllerError> {
        match event {
            NamespaceEvent::Added(ns) => self.on_namespace_added(ns).await,
            NamespaceEvent::Updated { old, new } => self.on_namespace_updated(old, new).await,
            NamespaceEvent::Deleted(ns) => {
                self.on_namespace_deleted(ns);
                Ok(())
            }
        }
    }

    /// Ensure bootstrap pair, tenant network and access bindings for `namespace`
    pub async fn on_namespace_added(&self, namespace: &Namespace) -> Result<(), ControllerError> {
        if !self.system_tenant_network_exists().await? {
            self.init_system_reserved_tenant_network().await?;
        }

        if !is_reserved_namespace(&namespace.name) {
            self.create_network_for_tenant(&namespace.name).await?;
        }

        self.sync_rbac(&namespace.name).await
    }

    /// Resync access bindings. Namespaces being deleted are left alone.
    pub async fn on_namespace_updated(
        &self,
        _old: &Namespace,
        new: &Namespace,
    ) -> Result<(), ControllerError> {
        if new.is_terminating() {
            debug!("Namespace {} is terminating, skipping sync", new.name);
            return Ok(());
        }
        self.sync_rbac(&new.name).await
    }

    /// Tenant teardown is owned by the tenant lifecycle controller
    pub fn on_namespace_deleted(&self, namespace: &Namespace) {
        info!("Namespace {} deleted", namespace.name);
    }

    /// Create the network for a tenant namespace. An existing network is success.
    pub async fn create_network_for_tenant(&self, namespace: &str) -> StoreResult<()> {
        let network = Network::for_namespace(namespace, &self.cidr, &self.gateway);
        match self.store.create_network(&network).await {
            Ok(_) => {
                info!("Created network {} ({} via {})", namespace, self.cidr, self.gateway);
                Ok(())
            }
            Err(e) if e.is_already_exists() => {
                debug!("Network {} already exists", namespace);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Create the bootstrap tenant, then the bootstrap network
    pub async fn init_system_reserved_tenant_network(&self) -> StoreResult<()> {
        match self.store.create_tenant(&Tenant::system()).await {
            Ok(_) => info!("Created system tenant {}", SYSTEM_TENANT),
            Err(e) if e.is_already_exists() => debug!("System tenant already exists"),
            Err(e) => return Err(e),
        }

        let network = Network::system(&self.cidr, &self.gateway);
        match self.store.create_network(&network).await {
            Ok(_) => info!("Created system network {}", SYSTEM_NETWORK),
            Err(e) if e.is_already_exists() => debug!("System network already exists"),
            Err(e) => return Err(e),
        }

        Ok(())
    }

    /// Apply both access bindings for `namespace`
    pub async fn sync_rbac(&self, namespace: &str) -> Result<(), ControllerError> {
        for binding in bindings_for_namespace(namespace) {
            self.bindings.apply(&binding).await?;
            debug!("Applied role binding {}/{}", binding.namespace(), binding.name());
        }
        Ok(())
    }

    async fn system_tenant_network_exists(&self) -> StoreResult<bool> {
        if !exists(self.store.get_tenant(SYSTEM_TENANT).await)? {
            return Ok(false);
        }
        exists(self.store.get_network(SYSTEM_NETWORK).await)
    }
}

fn exists<T>(lookup: StoreResult<T>) -> StoreResult<bool> {
    match lookup {
        Ok(_) => Ok(true),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e),
    }
}

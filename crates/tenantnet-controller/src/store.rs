//! Custom-resource store
//!
//! Persistence abstraction for tenants and networks:
//! - create fails with `AlreadyExists` when the name is taken
//! - lookups fail with `NotFound`
//! - anything else is a backend failure the caller may retry

use crate::model::{Network, Tenant};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

/// Store result type
pub type StoreResult<T> = Result<T, StoreError>;

/// Store errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} {name:?} already exists")]
    AlreadyExists { kind: &'static str, name: String },

    #[error("{kind} {name:?} not found")]
    NotFound { kind: &'static str, name: String },

    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Benign outcome of a repeated create
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Lookup miss
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Tenant/Network store trait
#[async_trait]
pub trait CrdStore: Send + Sync {
    /// Create tenant, returning the stored copy
    async fn create_tenant(&self, tenant: &Tenant) -> StoreResult<Tenant>;

    /// Get tenant by name
    async fn get_tenant(&self, name: &str) -> StoreResult<Tenant>;

    /// List all tenants
    async fn list_tenants(&self) -> StoreResult<Vec<Tenant>>;

    /// Create network, returning the stored copy
    async fn create_network(&self, network: &Network) -> StoreResult<Network>;

    /// Get network by name
    async fn get_network(&self, name: &str) -> StoreResult<Network>;

    /// List all networks
    async fn list_networks(&self) -> StoreResult<Vec<Network>>;
}

/// Store operations that can have an error injected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    CreateTenant,
    GetTenant,
    ListTenants,
    CreateNetwork,
    GetNetwork,
    ListNetworks,
}

/// In-memory store (for testing and dry runs)
pub struct InMemoryCrdStore {
    tenants: RwLock<HashMap<String, Tenant>>,
    networks: RwLock<HashMap<String, Network>>,
    errors: RwLock<HashMap<StoreOp, StoreError>>,
}

impl InMemoryCrdStore {
    pub fn new() -> Self {
        Self {
            tenants: RwLock::new(HashMap::new()),
            networks: RwLock::new(HashMap::new()),
            errors: RwLock::new(HashMap::new()),
        }
    }

    /// Make every call of `op` fail with `err` until cleared
    pub fn inject_error(&self, op: StoreOp, err: StoreError) {
        self.errors.write().insert(op, err);
    }

    /// Remove an injected error
    pub fn clear_error(&self, op: StoreOp) {
        self.errors.write().remove(&op);
    }

    /// Snapshot of stored tenants
    pub fn tenants(&self) -> HashMap<String, Tenant> {
        self.tenants.read().clone()
    }

    /// Snapshot of stored networks
    pub fn networks(&self) -> HashMap<String, Network> {
        self.networks.read().clone()
    }

    fn check(&self, op: StoreOp) -> StoreResult<()> {
        match self.errors.read().get(&op) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

impl Default for InMemoryCrdStore {
    fn default() -> Self {
        Self::new()
    }
}

fn stamp(meta: &mut crate::model::ObjectMeta) {
    meta.uid = Some(Uuid::new_v4());
    meta.creation_timestamp = Some(Utc::now());
}

#[async_trait]
impl CrdStore for InMemoryCrdStore {
    async fn create_tenant(&self, tenant: &Tenant) -> StoreResult<Tenant> {
        self.check(StoreOp::CreateTenant)?;

        // Check-and-insert under one write lock so racing creates yield one record
        let mut tenants = self.tenants.write();
        if tenants.contains_key(tenant.name()) {
            return Err(StoreError::AlreadyExists {
                kind: "tenant",
                name: tenant.name().to_string(),
            });
        }
        let mut stored = tenant.clone();
        stamp(&mut stored.metadata);
        tenants.insert(stored.name().to_string(), stored.clone());
        Ok(stored)
    }

    async fn get_tenant(&self, name: &str) -> StoreResult<Tenant> {
        self.check(StoreOp::GetTenant)?;
        self.tenants
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: "tenant",
                name: name.to_string(),
            })
    }

    async fn list_tenants(&self) -> StoreResult<Vec<Tenant>> {
        self.check(StoreOp::ListTenants)?;
        Ok(self.tenants.read().values().cloned().collect())
    }

    async fn create_network(&self, network: &Network) -> StoreResult<Network> {
        self.check(StoreOp::CreateNetwork)?;

        let mut networks = self.networks.write();
        if networks.contains_key(network.name()) {
            return Err(StoreError::AlreadyExists {
                kind: "network",
                name: network.name().to_string(),
            });
        }
        let mut stored = network.clone();
        stamp(&mut stored.metadata);
        networks.insert(stored.name().to_string(), stored.clone());
        Ok(stored)
    }

    async fn get_network(&self, name: &str) -> StoreResult<Network> {
        self.check(StoreOp::GetNetwork)?;
        self.networks
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: "network",
                name: name.to_string(),
            })
    }

    async fn list_networks(&self) -> StoreResult<Vec<Network>> {
        self.check(StoreOp::ListNetworks)?;
        Ok(self.networks.read().values().cloned().collect())
    }
}

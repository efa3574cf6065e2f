//! Tenant and Network Data Model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tenantnet_common::{SYSTEM_NETWORK, SYSTEM_PASSWORD, SYSTEM_TENANT};
use uuid::Uuid;

/// Object metadata shared by stored resources
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Resource name (unique per kind)
    pub name: String,
    /// Owning namespace
    pub namespace: String,
    /// Assigned by the store on create
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<Uuid>,
    /// Assigned by the store on create
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,
}

impl ObjectMeta {
    /// Metadata for a not-yet-stored object
    pub fn new(name: &str, namespace: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            uid: None,
            creation_timestamp: None,
        }
    }
}

/// Tenant: an isolated authentication/network domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    /// Metadata
    pub metadata: ObjectMeta,
    /// Desired state
    pub spec: TenantSpec,
}

/// Tenant credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantSpec {
    /// Principal name
    pub username: String,
    /// Credential reference
    pub password: String,
}

impl Tenant {
    /// Create a tenant living in the namespace of the same name
    pub fn new(name: &str, username: &str, password: &str) -> Self {
        Self {
            metadata: ObjectMeta::new(name, name),
            spec: TenantSpec {
                username: username.to_string(),
                password: password.to_string(),
            },
        }
    }

    /// The bootstrap tenant
    pub fn system() -> Self {
        Self::new(SYSTEM_TENANT, SYSTEM_TENANT, SYSTEM_PASSWORD)
    }

    /// Tenant name
    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}

/// Network: a virtual L3 segment bound to one tenant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    /// Metadata
    pub metadata: ObjectMeta,
    /// Desired state
    pub spec: NetworkSpec,
}

/// Network addressing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSpec {
    /// Segment CIDR
    pub cidr: String,
    /// Gateway address inside `cidr`
    pub gateway: String,
    /// Filled in by the SDN controller once the segment exists there
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_id: Option<String>,
}

impl Network {
    /// Network for a tenant namespace
    pub fn for_namespace(namespace: &str, cidr: &str, gateway: &str) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, namespace),
            spec: NetworkSpec {
                cidr: cidr.to_string(),
                gateway: gateway.to_string(),
                network_id: None,
            },
        }
    }

    /// The bootstrap network, owned by the bootstrap tenant
    pub fn system(cidr: &str, gateway: &str) -> Self {
        Self {
            metadata: ObjectMeta::new(SYSTEM_NETWORK, SYSTEM_TENANT),
            spec: NetworkSpec {
                cidr: cidr.to_string(),
                gateway: gateway.to_string(),
                network_id: None,
            },
        }
    }

    /// Network name
    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}

/// Platform namespace as seen by the event source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    /// Namespace name
    pub name: String,
    /// Lifecycle phase
    #[serde(default)]
    pub phase: NamespacePhase,
}

impl Namespace {
    /// Active namespace
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            phase: NamespacePhase::Active,
        }
    }

    /// Whether deletion has begun
    pub fn is_terminating(&self) -> bool {
        self.phase == NamespacePhase::Terminating
    }
}

/// Namespace lifecycle phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NamespacePhase {
    /// Normal operation
    #[default]
    Active,
    /// Being deleted
    Terminating,
}

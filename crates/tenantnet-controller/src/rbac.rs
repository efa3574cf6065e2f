//! Access bindings
//!
//! Two role bindings per namespace, regenerated from the namespace name on
//! every reconcile and applied with create-or-replace semantics. The role
//! itself is a fixed input; only the binding shape lives here.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// RBAC API group
pub const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

/// Namespace-scoped administrative role granted to every tenant
pub const DEFAULT_ROLE: &str = "default-role";

/// Workload identity bound in every namespace
pub const DEFAULT_SERVICE_ACCOUNT: &str = "default";

/// Role binding descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleBinding {
    pub api_version: String,
    pub kind: String,
    pub metadata: BindingMeta,
    pub subjects: Vec<Subject>,
    pub role_ref: RoleRef,
}

impl RoleBinding {
    /// Binding name
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Binding namespace
    pub fn namespace(&self) -> &str {
        &self.metadata.namespace
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingMeta {
    pub name: String,
    pub namespace: String,
}

/// Grantee of a binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_group: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleRef {
    pub api_group: String,
    pub kind: String,
    pub name: String,
}

impl RoleRef {
    fn default_role() -> Self {
        Self {
            api_group: RBAC_API_GROUP.to_string(),
            kind: "ClusterRole".to_string(),
            name: DEFAULT_ROLE.to_string(),
        }
    }
}

fn binding(name: String, namespace: &str, subject: Subject) -> RoleBinding {
    RoleBinding {
        api_version: format!("{}/v1", RBAC_API_GROUP),
        kind: "RoleBinding".to_string(),
        metadata: BindingMeta {
            name,
            namespace: namespace.to_string(),
        },
        subjects: vec![subject],
        role_ref: RoleRef::default_role(),
    }
}

/// Bind the tenant principal to the default role in `namespace`
pub fn generate_role_binding(namespace: &str, tenant: &str) -> RoleBinding {
    binding(
        format!("{}-rolebinding", namespace),
        namespace,
        Subject {
            kind: "Group".to_string(),
            name: tenant.to_string(),
            namespace: None,
            api_group: Some(RBAC_API_GROUP.to_string()),
        },
    )
}

/// Bind the namespace's default service account to the default role
pub fn generate_service_account_role_binding(namespace: &str, _tenant: &str) -> RoleBinding {
    binding(
        format!("{}-rolebinding-sa", namespace),
        namespace,
        Subject {
            kind: "ServiceAccount".to_string(),
            name: DEFAULT_SERVICE_ACCOUNT.to_string(),
            namespace: Some(namespace.to_string()),
            api_group: None,
        },
    )
}

/// Both bindings for a namespace. The tenant is named after its namespace.
pub fn bindings_for_namespace(namespace: &str) -> [RoleBinding; 2] {
    [
        generate_role_binding(namespace, namespace),
        generate_service_account_role_binding(namespace, namespace),
    ]
}

/// Binding applier errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BindingError {
    #[error("binding backend error: {0}")]
    Backend(String),
}

/// Create-or-replace applier for role bindings
#[async_trait]
pub trait RoleBindingApplier: Send + Sync {
    /// Create the binding, or replace the existing one of the same name
    async fn apply(&self, binding: &RoleBinding) -> Result<(), BindingError>;
}

/// In-memory applier (for testing and dry runs)
pub struct InMemoryRoleBindingApplier {
    bindings: RwLock<BTreeMap<(String, String), RoleBinding>>,
    failure: RwLock<Option<BindingError>>,
    applied: AtomicU64,
}

impl InMemoryRoleBindingApplier {
    pub fn new() -> Self {
        Self {
            bindings: RwLock::new(BTreeMap::new()),
            failure: RwLock::new(None),
            applied: AtomicU64::new(0),
        }
    }

    /// Make every apply fail until cleared
    pub fn inject_error(&self, err: BindingError) {
        *self.failure.write() = Some(err);
    }

    /// Remove an injected error
    pub fn clear_error(&self) {
        *self.failure.write() = None;
    }

    /// Look up a binding
    pub fn get(&self, namespace: &str, name: &str) -> Option<RoleBinding> {
        self.bindings
            .read()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// All stored bindings, ordered by namespace then name
    pub fn all(&self) -> Vec<RoleBinding> {
        self.bindings.read().values().cloned().collect()
    }

    /// Number of distinct bindings stored
    pub fn len(&self) -> usize {
        self.bindings.read().len()
    }

    /// Whether nothing is stored
    pub fn is_empty(&self) -> bool {
        self.bindings.read().is_empty()
    }

    /// Number of successful apply calls, including replacements
    pub fn applied_count(&self) -> u64 {
        self.applied.load(Ordering::Relaxed)
    }
}

impl Default for InMemoryRoleBindingApplier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RoleBindingApplier for InMemoryRoleBindingApplier {
    async fn apply(&self, binding: &RoleBinding) -> Result<(), BindingError> {
        if let Some(err) = self.failure.read().clone() {
            return Err(err);
        }
        self.bindings.write().insert(
            (binding.namespace().to_string(), binding.name().to_string()),
            binding.clone(),
        );
        self.applied.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

//! Tenant/Network Reconciler
//!
//! Maps platform namespaces to tenant/network records and access bindings.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     TENANT / NETWORK RECONCILER                         │
//! │                                                                         │
//! │   namespace events ──► EventDispatcher (serial, redelivers on error)    │
//! │                                │                                        │
//! │                                ▼                                        │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                 TenantNetworkController                          │  │
//! │  │   1. bootstrap pair   2. tenant network   3. access bindings     │  │
//! │  └───────┬──────────────────────┬──────────────────────┬────────────┘  │
//! │          │                      │                      │               │
//! │  ┌───────▼────────┐    ┌────────▼───────┐    ┌─────────▼──────────┐    │
//! │  │   CrdStore     │    │   CrdStore     │    │ RoleBindingApplier │    │
//! │  │   (tenants)    │    │   (networks)   │    │ (create-or-replace)│    │
//! │  └────────────────┘    └────────────────┘    └────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod controller;
pub mod events;
pub mod model;
pub mod rbac;
pub mod store;

pub use controller::{ControllerError, TenantNetworkController};
pub use events::{DispatchStats, EventDispatcher, NamespaceEvent};
pub use model::{Namespace, NamespacePhase, Network, NetworkSpec, ObjectMeta, Tenant, TenantSpec};
pub use rbac::{
    bindings_for_namespace, BindingError, InMemoryRoleBindingApplier, RoleBinding,
    RoleBindingApplier,
};
pub use store::{CrdStore, InMemoryCrdStore, StoreError, StoreOp, StoreResult};

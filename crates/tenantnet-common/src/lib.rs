//! tenantnet common - configuration surface and reserved names
//!
//! Shared by the control-plane reconciler and the data-plane plugins. The two
//! halves never share runtime state; they only agree on the values defined
//! here (default CIDR/gateway, integration bridge, backend name).

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod reserved;

pub use config::{TenantNetConfig, DEFAULT_CONFIG_PATH, ENV_PREFIX};
pub use error::{ConfigError, ConfigResult};
pub use reserved::{
    is_reserved_namespace, RESERVED_NAMESPACES, SYSTEM_NETWORK, SYSTEM_PASSWORD, SYSTEM_TENANT,
};

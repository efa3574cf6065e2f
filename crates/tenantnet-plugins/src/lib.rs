//! TenantNet Interface Provisioners
//!
//! Wires workload sandboxes into the switch fabric. Backends implement
//! [`NetworkPlugin`] and are looked up by name in a [`PluginRegistry`].
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     AttachManager                        │
//! │              (per-port serialization)                    │
//! ├──────────────────────────────────────────────────────────┤
//! │   PluginRegistry ──► NetworkPlugin (ovs, ...)            │
//! ├──────────────────────────────────────────────────────────┤
//! │   NetAdmin (links, bridges, netns, fabric ports)         │
//! │   NetnsResolver (sandbox id → namespace)                 │
//! ├──────────────────────────────────────────────────────────┤
//! │   CommandRunner (host processes | scripted mock)         │
//! └──────────────────────────────────────────────────────────┘
//! ```

#![warn(clippy::all)]

pub mod attach;
pub mod command;
pub mod error;
pub mod naming;
pub mod netadmin;
pub mod netns;
pub mod ovs;
pub mod plugin;
pub mod registry;

pub use attach::AttachManager;
pub use command::{CommandRunner, HostCommandRunner, MockCommandRunner};
pub use error::{CommandError, PluginError, PluginResult};
pub use naming::DeviceNames;
pub use netadmin::NetAdmin;
pub use netns::{DockerNetnsResolver, NetnsResolver};
pub use ovs::OvsPlugin;
pub use plugin::{AttachRequest, Interface, NetworkPlugin, PluginEnv, Port};
pub use registry::{PluginFactory, PluginRegistry};

//! Device naming
//!
//! All device names for a port are derived from the port id alone, so
//! teardown can find everything setup created without stored state.

/// Longest device name we generate, in bytes (IFNAMSIZ leaves 15 usable, keep one spare)
pub const MAX_DEVICE_NAME_LEN: usize = 14;

/// Local bridge between the fabric veth and the sandbox tap
pub const BRIDGE_PREFIX: &str = "qbr";
/// Host-side end of the sandbox pair
pub const TAP_PREFIX: &str = "tap";
/// Sandbox-side end of the sandbox pair
pub const VIF_PREFIX: &str = "vif";
/// Bridge-side end of the fabric pair
pub const VETH_BRIDGE_PREFIX: &str = "qvb";
/// Fabric-side end of the fabric pair
pub const VETH_FABRIC_PREFIX: &str = "qvo";

/// The kernel limit counts bytes, so cut on the last char boundary that fits
fn device_name(prefix: &str, port_id: &str) -> String {
    let mut name = String::with_capacity(MAX_DEVICE_NAME_LEN);
    for c in prefix.chars().chain(port_id.chars()) {
        if name.len() + c.len_utf8() > MAX_DEVICE_NAME_LEN {
            break;
        }
        name.push(c);
    }
    name
}

/// Every device name belonging to one port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceNames {
    pub bridge: String,
    pub tap: String,
    pub vif: String,
    pub veth_bridge: String,
    pub veth_fabric: String,
}

impl DeviceNames {
    pub fn for_port(port_id: &str) -> Self {
        Self {
            bridge: device_name(BRIDGE_PREFIX, port_id),
            tap: device_name(TAP_PREFIX, port_id),
            vif: device_name(VIF_PREFIX, port_id),
            veth_bridge: device_name(VETH_BRIDGE_PREFIX, port_id),
            veth_fabric: device_name(VETH_FABRIC_PREFIX, port_id),
        }
    }
}

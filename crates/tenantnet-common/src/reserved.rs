//! Reserved tenant, network and namespace names

/// Name of the bootstrap tenant. Also its namespace and username.
pub const SYSTEM_TENANT: &str = "default";

/// Password of the bootstrap tenant
pub const SYSTEM_PASSWORD: &str = "password";

/// Name of the bootstrap network
pub const SYSTEM_NETWORK: &str = "default";

/// Platform-managed namespaces that map to the bootstrap tenant/network
pub const RESERVED_NAMESPACES: [&str; 3] = ["default", "kube-system", "kube-public"];

/// Whether `namespace` is platform-managed
pub fn is_reserved_namespace(namespace: &str) -> bool {
    RESERVED_NAMESPACES.contains(&namespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_namespaces() {
        assert!(is_reserved_namespace("default"));
        assert!(is_reserved_namespace("kube-system"));
        assert!(is_reserved_namespace("kube-public"));
        assert!(!is_reserved_namespace("test"));
        assert!(!is_reserved_namespace("kube-system-2"));
    }
}

//! Namespace constants.

/// Namespace used when a request does not name one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Namespace for the server's own objects.
pub const SYSTEM_NAMESPACE: &str = "poolrs-system";

/// Namespaces seeded on every server start.
pub const DEFAULT_NAMESPACES: &[&str] = &[DEFAULT_NAMESPACE, SYSTEM_NAMESPACE];

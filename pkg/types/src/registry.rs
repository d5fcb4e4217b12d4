//! Explicit registry of the resource kinds the control plane serves.
//!
//! Built once at startup and handed to the API and controllers; nothing is
//! registered through global state.

use pkg_constants::state::REGISTRY_PREFIX;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Namespace,
    ResourcePool,
    ResourcePoolClaim,
    ResourceQuota,
}

impl ResourceKind {
    /// Lower-case plural used in keys and URLs.
    pub fn plural(&self) -> &'static str {
        match self {
            ResourceKind::Namespace => "namespaces",
            ResourceKind::ResourcePool => "resourcepools",
            ResourceKind::ResourcePoolClaim => "resourcepoolclaims",
            ResourceKind::ResourceQuota => "resourcequotas",
        }
    }

    pub fn is_namespaced(&self) -> bool {
        matches!(
            self,
            ResourceKind::ResourcePoolClaim | ResourceKind::ResourceQuota
        )
    }

    /// Storage key of a single object. `namespace` is ignored for
    /// cluster-scoped kinds.
    pub fn key(&self, namespace: &str, name: &str) -> String {
        if self.is_namespaced() {
            format!("{}/{}/{}/{}", REGISTRY_PREFIX, self.plural(), namespace, name)
        } else {
            format!("{}/{}/{}", REGISTRY_PREFIX, self.plural(), name)
        }
    }

    /// Prefix listing every object of this kind, optionally within one
    /// namespace.
    pub fn prefix(&self, namespace: Option<&str>) -> String {
        match namespace {
            Some(ns) if self.is_namespaced() => {
                format!("{}/{}/{}/", REGISTRY_PREFIX, self.plural(), ns)
            }
            _ => format!("{}/{}/", REGISTRY_PREFIX, self.plural()),
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ResourceKind::Namespace => "Namespace",
            ResourceKind::ResourcePool => "ResourcePool",
            ResourceKind::ResourcePoolClaim => "ResourcePoolClaim",
            ResourceKind::ResourceQuota => "ResourceQuota",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Registry {
    kinds: BTreeMap<&'static str, ResourceKind>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every kind this workspace defines.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for kind in [
            ResourceKind::Namespace,
            ResourceKind::ResourcePool,
            ResourceKind::ResourcePoolClaim,
            ResourceKind::ResourceQuota,
        ] {
            registry.register(kind);
        }
        registry
    }

    pub fn register(&mut self, kind: ResourceKind) {
        self.kinds.insert(kind.plural(), kind);
    }

    pub fn lookup(&self, plural: &str) -> Option<ResourceKind> {
        self.kinds.get(plural).copied()
    }

    pub fn kinds(&self) -> impl Iterator<Item = ResourceKind> + '_ {
        self.kinds.values().copied()
    }
}

use chrono::{DateTime, Utc};
use pkg_constants::pool::POOL_QUOTA_NAME_PREFIX;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::ledger::ClaimLedger;
use crate::quantity::Quantity;
use crate::resources::ResourceList;
use crate::selector::NamespaceSelector;

/// Cluster-scoped pool of quota shared by the namespaces its selectors
/// match. Namespaces draw from it through `ResourcePoolClaim`s.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcePool {
    #[serde(default)]
    pub uid: String,
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub generation: u64,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// Set when deletion was requested while claims were still bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
    pub spec: ResourcePoolSpec,
    #[serde(default)]
    pub status: ResourcePoolStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcePoolSpec {
    #[serde(default)]
    pub selectors: Vec<NamespaceSelector>,
    pub quota: PoolQuota,
    /// Added to every member namespace's quota; not counted as claimed.
    #[serde(default)]
    pub defaults: ResourceList,
    #[serde(default)]
    pub config: ResourcePoolConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolQuota {
    #[serde(default)]
    pub hard: ResourceList,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcePoolConfig {
    /// Give every hard resource a zero default unless one is set.
    #[serde(default, rename = "defaultsZero")]
    pub defaults_assign_zero: bool,
    /// Admit claims strictly in creation order.
    #[serde(default)]
    pub ordered_queue: bool,
    /// Delete bound claims instead of disassociating them when the pool goes.
    #[serde(default)]
    pub delete_bound_resources: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcePoolStatus {
    #[serde(default)]
    pub namespace_count: usize,
    #[serde(default)]
    pub claim_count: usize,
    #[serde(default)]
    pub namespaces: Vec<String>,
    #[serde(default)]
    pub claims: ClaimLedger,
    #[serde(default)]
    pub allocation: PoolAllocation,
    #[serde(default)]
    pub exhaustions: BTreeMap<String, PoolExhaustion>,
}

/// Derived aggregates. `claimed` is persisted under `used`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolAllocation {
    #[serde(default)]
    pub hard: ResourceList,
    #[serde(default, rename = "used")]
    pub claimed: ResourceList,
    #[serde(default)]
    pub available: ResourceList,
}

/// A resource that pending claims asked for but could not get.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolExhaustion {
    pub available: Quantity,
    pub requesting: Quantity,
}

/// Pool identity as recorded on a claim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolReference {
    pub name: String,
    pub uid: String,
}

impl ResourcePool {
    pub fn is_deleting(&self) -> bool {
        self.deletion_timestamp.is_some()
    }

    pub fn reference(&self) -> PoolReference {
        PoolReference {
            name: self.name.clone(),
            uid: self.uid.clone(),
        }
    }

    /// Name of the ResourceQuota this pool projects into each namespace.
    pub fn quota_name(&self) -> String {
        format!("{}{}", POOL_QUOTA_NAME_PREFIX, self.name)
    }

    pub fn has_namespace(&self, namespace: &str) -> bool {
        self.status.namespaces.binary_search_by(|n| n.as_str().cmp(namespace)).is_ok()
    }
}

impl ResourcePoolStatus {
    /// Record the member namespaces (sorted, unique).
    pub fn assign_namespaces(&mut self, mut namespaces: Vec<String>) {
        namespaces.sort();
        namespaces.dedup();
        self.namespace_count = namespaces.len();
        self.namespaces = namespaces;
    }

    /// Refresh the reported claim count from the ledger.
    pub fn assign_claims(&mut self) {
        self.claim_count = self.claims.count_claims();
    }
}

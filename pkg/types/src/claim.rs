use chrono::{DateTime, Utc};
use pkg_constants::conditions::BOUND_CONDITION;
use pkg_constants::pool::RELEASE_ANNOTATION;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::condition::{Condition, ConditionList};
use crate::ledger::ClaimItem;
use crate::pool::PoolReference;
use crate::resources::ResourceList;

/// Namespaced request for a slice of a pool's quota.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcePoolClaim {
    #[serde(default)]
    pub uid: String,
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub generation: u64,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    pub spec: ResourcePoolClaimSpec,
    #[serde(default)]
    pub status: ResourcePoolClaimStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourcePoolClaimSpec {
    /// Name of the pool to claim from. Immutable while bound.
    pub pool: String,
    #[serde(default, rename = "claim")]
    pub resource_claims: ResourceList,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourcePoolClaimStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool: Option<PoolReference>,
    /// Deprecated single condition; always the projection of `conditions`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    #[serde(default)]
    pub conditions: ConditionList,
    /// What the pool actually granted to this claim.
    #[serde(default)]
    pub allocation: ResourceList,
}

impl ResourcePoolClaimStatus {
    /// Update a condition and refresh the legacy field. Returns whether
    /// anything changed.
    pub fn set_condition(&mut self, condition: Condition) -> bool {
        let changed = self.conditions.update(condition);
        self.refresh_legacy_condition();
        changed
    }

    pub fn remove_condition(&mut self, type_: &str) -> bool {
        let changed = self.conditions.remove(type_);
        self.refresh_legacy_condition();
        changed
    }

    pub fn refresh_legacy_condition(&mut self) {
        self.condition = self.conditions.legacy_projection();
    }
}

impl ResourcePoolClaim {
    pub fn is_bound(&self) -> bool {
        self.status.conditions.is_true(BOUND_CONDITION)
    }

    /// The release annotation asks the pool to let go of this claim.
    pub fn is_released(&self) -> bool {
        self.annotations
            .get(RELEASE_ANNOTATION)
            .is_some_and(|v| v == "true")
    }

    /// Whether the claim's back-reference points at the given pool.
    pub fn references_pool(&self, pool_uid: &str) -> bool {
        self.status
            .pool
            .as_ref()
            .is_some_and(|r| !r.uid.is_empty() && r.uid == pool_uid)
    }

    /// The ledger record this claim contributes when bound.
    pub fn to_claim_item(&self) -> ClaimItem {
        ClaimItem {
            uid: self.uid.clone(),
            name: self.name.clone(),
            claims: self.spec.resource_claims.clone(),
        }
    }
}

/// Admission priority: oldest first, then name, then namespace, so claims
/// created in the same instant still get a stable order.
pub fn queue_order(a: &ResourcePoolClaim, b: &ResourcePoolClaim) -> Ordering {
    a.created_at
        .cmp(&b.created_at)
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.namespace.cmp(&b.namespace))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::ConditionStatus;
    use chrono::TimeZone;
    use pkg_constants::conditions::{POOL_EXHAUSTED_REASON, SUCCEEDED_REASON};

    fn make_claim(name: &str, ns: &str, secs: i64) -> ResourcePoolClaim {
        ResourcePoolClaim {
            uid: format!("{}-uid", name),
            name: name.to_string(),
            namespace: ns.to_string(),
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            generation: 1,
            created_at: Utc.timestamp_opt(secs, 0).unwrap(),
            spec: ResourcePoolClaimSpec {
                pool: "shared".to_string(),
                resource_claims: ResourceList::new(),
            },
            status: ResourcePoolClaimStatus::default(),
        }
    }

    #[test]
    fn test_queue_order_ties() {
        let mut claims = vec![
            make_claim("b", "ns1", 10),
            make_claim("a", "ns2", 10),
            make_claim("a", "ns1", 10),
            make_claim("z", "ns1", 5),
        ];
        claims.sort_by(queue_order);
        let order: Vec<_> = claims
            .iter()
            .map(|c| format!("{}/{}", c.namespace, c.name))
            .collect();
        assert_eq!(order, vec!["ns1/z", "ns1/a", "ns2/a", "ns1/b"]);
    }

    #[test]
    fn test_legacy_condition_tracks_list() {
        let mut claim = make_claim("c", "ns", 0);
        assert!(!claim.is_bound());

        claim.status.set_condition(Condition::new(
            BOUND_CONDITION,
            ConditionStatus::False,
            POOL_EXHAUSTED_REASON,
            "requested: cpu=2, available: cpu=1",
        ));
        assert_eq!(claim.status.condition.as_ref().unwrap().reason, POOL_EXHAUSTED_REASON);

        claim.status.set_condition(Condition::new(
            BOUND_CONDITION,
            ConditionStatus::True,
            SUCCEEDED_REASON,
            "Claimed resources",
        ));
        assert!(claim.is_bound());
        assert_eq!(claim.status.condition.as_ref().unwrap().status, ConditionStatus::True);

        claim.status.remove_condition(BOUND_CONDITION);
        assert!(claim.status.condition.is_none());
    }

    #[test]
    fn test_release_annotation() {
        let mut claim = make_claim("c", "ns", 0);
        assert!(!claim.is_released());
        claim
            .annotations
            .insert(RELEASE_ANNOTATION.to_string(), "true".to_string());
        assert!(claim.is_released());
    }
}

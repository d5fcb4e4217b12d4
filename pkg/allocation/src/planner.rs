//! One full pool pass, computed without I/O.
//!
//! The pool controller gathers namespaces and claims, calls [`plan_pass`]
//! on a fresh read of the pool, and compare-and-swaps the resulting status.
//! Claim conditions, evictions and quota projection are applied from the
//! plan after the commit.

use pkg_types::claim::{ResourcePoolClaim, queue_order};
use pkg_types::ledger::ClaimItem;
use pkg_types::pool::{ResourcePool, ResourcePoolStatus};
use std::collections::{BTreeMap, BTreeSet};

use crate::allocator::{self, AdmissionPolicy, ExhaustionMap};
use crate::error::ResourceViolation;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimDecision {
    /// Added to the ledger during this pass.
    Granted,
    /// Already in the ledger.
    Held,
    Rejected(Vec<ResourceViolation>),
}

#[derive(Debug, Clone)]
pub struct ClaimOutcome {
    pub namespace: String,
    pub name: String,
    pub uid: String,
    pub decision: ClaimDecision,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eviction {
    /// Clear the claim's back-reference and leave the object alone.
    Disassociate,
    /// Delete the claim object.
    Delete,
}

/// A ledger entry dropped by garbage collection.
#[derive(Debug, Clone)]
pub struct EvictedClaim {
    pub namespace: String,
    pub item: ClaimItem,
    pub action: Eviction,
}

#[derive(Debug, Clone)]
pub struct PoolPlan {
    pub status: ResourcePoolStatus,
    pub outcomes: Vec<ClaimOutcome>,
    pub evicted: Vec<EvictedClaim>,
    /// Former members whose projected quota must go.
    pub departed_namespaces: Vec<String>,
}

impl PoolPlan {
    /// A deleting pool whose ledger has drained can be removed.
    pub fn drained(&self) -> bool {
        self.status.claims.is_empty()
    }
}

/// Compute the next status of `pool`.
///
/// `namespaces` are the resolved member namespaces; `claims` may contain
/// any claim, only those pointing at this pool by UID, living in a member
/// namespace and not released take part. A deleting pool has no members,
/// so its whole ledger is evicted.
pub fn plan_pass(
    pool: &ResourcePool,
    namespaces: &[String],
    claims: &[ResourcePoolClaim],
) -> PoolPlan {
    let deleting = pool.is_deleting();
    let mut status = pool.status.clone();
    status.allocation.hard = pool.spec.quota.hard.clone();

    let members: BTreeSet<&str> = if deleting {
        BTreeSet::new()
    } else {
        namespaces.iter().map(String::as_str).collect()
    };
    let departed_namespaces = pool
        .status
        .namespaces
        .iter()
        .filter(|ns| !members.contains(ns.as_str()))
        .cloned()
        .collect();

    let mut active: Vec<&ResourcePoolClaim> = claims
        .iter()
        .filter(|c| c.references_pool(&pool.uid))
        .filter(|c| members.contains(c.namespace.as_str()))
        .filter(|c| !c.is_released())
        .collect();
    active.sort_by(|a, b| queue_order(a, b));
    let active_uids: BTreeSet<&str> = active.iter().map(|c| c.uid.as_str()).collect();
    let by_uid: BTreeMap<&str, &ResourcePoolClaim> =
        claims.iter().map(|c| (c.uid.as_str(), c)).collect();

    let stale: Vec<(String, String)> = status
        .claims
        .iter()
        .filter(|(ns, item)| !members.contains(ns) || !active_uids.contains(item.uid.as_str()))
        .map(|(ns, item)| (ns.to_string(), item.uid.clone()))
        .collect();
    let mut evicted = Vec::with_capacity(stale.len());
    for (namespace, uid) in stale {
        let Some(item) = status.claims.remove(&namespace, &uid) else {
            continue;
        };
        let released = by_uid.get(uid.as_str()).is_some_and(|c| c.is_released());
        let action = if deleting && pool.spec.config.delete_bound_resources && !released {
            Eviction::Delete
        } else {
            Eviction::Disassociate
        };
        evicted.push(EvictedClaim {
            namespace,
            item,
            action,
        });
    }
    allocator::recalculate(&mut status.allocation, &status.claims);

    let policy = AdmissionPolicy::for_config(&pool.spec.config);
    let mut exhaustions = ExhaustionMap::new();
    let mut outcomes = Vec::with_capacity(active.len());
    for claim in active {
        let decision = if status.claims.get(&claim.namespace, &claim.uid).is_some() {
            ClaimDecision::Held
        } else {
            let violations = allocator::can_claim(
                &claim.spec.resource_claims,
                &status.allocation.available,
                policy,
                &exhaustions,
            );
            if violations.is_empty() {
                status
                    .claims
                    .upsert(&claim.namespace, claim.to_claim_item());
                allocator::recalculate(&mut status.allocation, &status.claims);
                ClaimDecision::Granted
            } else {
                allocator::record_exhaustions(&mut exhaustions, &violations);
                ClaimDecision::Rejected(violations)
            }
        };
        outcomes.push(ClaimOutcome {
            namespace: claim.namespace.clone(),
            name: claim.name.clone(),
            uid: claim.uid.clone(),
            decision,
        });
    }

    status.exhaustions = exhaustions;
    status.assign_namespaces(members.iter().map(|ns| ns.to_string()).collect());
    status.assign_claims();

    PoolPlan {
        status,
        outcomes,
        evicted,
        departed_namespaces,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pkg_constants::pool::RELEASE_ANNOTATION;
    use pkg_types::ResourceList;
    use pkg_types::claim::{ResourcePoolClaimSpec, ResourcePoolClaimStatus};
    use pkg_types::pool::{PoolQuota, ResourcePoolConfig, ResourcePoolSpec};
    use pkg_types::resources::parse_resource_list;

    fn list(pairs: &[(&str, &str)]) -> ResourceList {
        parse_resource_list(pairs).unwrap()
    }

    fn make_pool(hard: &[(&str, &str)], config: ResourcePoolConfig) -> ResourcePool {
        ResourcePool {
            uid: "pool-uid".into(),
            name: "shared".into(),
            labels: BTreeMap::new(),
            generation: 1,
            created_at: Utc::now(),
            deletion_timestamp: None,
            spec: ResourcePoolSpec {
                selectors: vec![],
                quota: PoolQuota { hard: list(hard) },
                defaults: ResourceList::new(),
                config,
            },
            status: ResourcePoolStatus::default(),
        }
    }

    fn make_claim(ns: &str, name: &str, secs: i64, pairs: &[(&str, &str)]) -> ResourcePoolClaim {
        let mut claim = ResourcePoolClaim {
            uid: format!("{}-{}", ns, name),
            name: name.into(),
            namespace: ns.into(),
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            generation: 1,
            created_at: Utc.timestamp_opt(secs, 0).unwrap(),
            spec: ResourcePoolClaimSpec {
                pool: "shared".into(),
                resource_claims: list(pairs),
            },
            status: ResourcePoolClaimStatus::default(),
        };
        claim.status.pool = Some(pkg_types::PoolReference {
            name: "shared".into(),
            uid: "pool-uid".into(),
        });
        claim
    }

    fn members(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn decisions(plan: &PoolPlan) -> Vec<(&str, &ClaimDecision)> {
        plan.outcomes
            .iter()
            .map(|o| (o.name.as_str(), &o.decision))
            .collect()
    }

    #[test]
    fn test_first_fit_skips_past_a_large_claim() {
        let pool = make_pool(&[("cpu", "2")], ResourcePoolConfig::default());
        let claims = vec![
            make_claim("a", "big", 1, &[("cpu", "3")]),
            make_claim("a", "small", 2, &[("cpu", "1")]),
        ];
        let plan = plan_pass(&pool, &members(&["a"]), &claims);

        assert!(matches!(plan.outcomes[0].decision, ClaimDecision::Rejected(_)));
        assert_eq!(plan.outcomes[1].decision, ClaimDecision::Granted);
        assert_eq!(plan.status.allocation.claimed, list(&[("cpu", "1")]));
        assert_eq!(plan.status.allocation.available, list(&[("cpu", "1")]));
        assert_eq!(plan.status.exhaustions["cpu"].requesting, "3".parse().unwrap());
        assert_eq!(plan.status.exhaustions["cpu"].available, "2".parse().unwrap());
        assert_eq!(plan.status.claim_count, 1);
    }

    #[test]
    fn test_ordered_queue_holds_capacity_for_older_claim() {
        let config = ResourcePoolConfig {
            ordered_queue: true,
            ..Default::default()
        };
        let pool = make_pool(&[("cpu", "2"), ("mem", "1Gi")], config);
        let claims = vec![
            make_claim("a", "small-late", 3, &[("cpu", "1")]),
            make_claim("a", "big", 1, &[("cpu", "3")]),
            make_claim("b", "mem-only", 2, &[("mem", "512Mi")]),
        ];
        let plan = plan_pass(&pool, &members(&["a", "b"]), &claims);

        let got = decisions(&plan);
        assert_eq!(got[0].0, "big");
        assert!(matches!(got[0].1, ClaimDecision::Rejected(v) if !v[0].is_queued()));
        assert_eq!(got[1], ("mem-only", &ClaimDecision::Granted));
        assert_eq!(got[2].0, "small-late");
        assert!(matches!(got[2].1, ClaimDecision::Rejected(v) if v[0].is_queued()));
        assert_eq!(plan.status.allocation.claimed["cpu"], "0".parse().unwrap());
    }

    #[test]
    fn test_claim_exhausted_beside_a_queued_resource_holds_its_place() {
        let config = ResourcePoolConfig {
            ordered_queue: true,
            ..Default::default()
        };
        let pool = make_pool(&[("cpu", "2"), ("mem", "1Gi")], config);
        let claims = vec![
            make_claim("a", "cpu-hog", 1, &[("cpu", "4")]),
            make_claim("a", "older", 2, &[("cpu", "1"), ("mem", "2Gi")]),
            make_claim("b", "younger", 3, &[("mem", "1Gi")]),
        ];
        let plan = plan_pass(&pool, &members(&["a", "b"]), &claims);

        let got = decisions(&plan);
        assert_eq!(got[1].0, "older");
        let ClaimDecision::Rejected(violations) = got[1].1 else {
            panic!("older claim should be rejected");
        };
        assert!(violations.iter().any(|v| v.resource == "cpu" && v.is_queued()));
        assert!(violations.iter().any(|v| v.resource == "mem" && !v.is_queued()));

        // mem is exhausted for the older claim, so the younger one waits.
        assert_eq!(got[2].0, "younger");
        assert!(matches!(got[2].1, ClaimDecision::Rejected(v) if v[0].is_queued()));
        assert_eq!(plan.status.exhaustions["mem"].requesting, "2Gi".parse().unwrap());
        assert_eq!(plan.status.allocation.claimed["mem"], "0".parse().unwrap());
    }

    #[test]
    fn test_bound_claims_are_held_and_not_recounted() {
        let mut pool = make_pool(&[("cpu", "2")], ResourcePoolConfig::default());
        let claim = make_claim("a", "c1", 1, &[("cpu", "1")]);
        pool.status.claims.upsert("a", claim.to_claim_item());

        let plan = plan_pass(&pool, &members(&["a"]), std::slice::from_ref(&claim));
        assert_eq!(plan.outcomes[0].decision, ClaimDecision::Held);
        assert_eq!(plan.status.allocation.claimed, list(&[("cpu", "1")]));

        // Running the pass again on its own output changes nothing.
        let mut next = pool.clone();
        next.status = plan.status.clone();
        let again = plan_pass(&next, &members(&["a"]), &[claim]);
        assert_eq!(again.status, plan.status);
    }

    #[test]
    fn test_gc_departed_namespace_and_released_claims() {
        let mut pool = make_pool(&[("cpu", "4")], ResourcePoolConfig::default());
        let kept = make_claim("a", "kept", 1, &[("cpu", "1")]);
        let mut released = make_claim("a", "released", 2, &[("cpu", "1")]);
        released
            .annotations
            .insert(RELEASE_ANNOTATION.into(), "true".into());
        let moved = make_claim("gone", "moved", 3, &[("cpu", "1")]);
        for c in [&kept, &released, &moved] {
            pool.status.claims.upsert(&c.namespace, c.to_claim_item());
        }
        pool.status.assign_namespaces(members(&["a", "gone"]));

        let plan = plan_pass(&pool, &members(&["a"]), &[kept, released, moved]);

        let evicted: Vec<_> = plan.evicted.iter().map(|e| e.item.name.as_str()).collect();
        assert_eq!(evicted, vec!["released", "moved"]);
        assert!(plan.evicted.iter().all(|e| e.action == Eviction::Disassociate));
        assert_eq!(plan.departed_namespaces, members(&["gone"]));
        assert!(!plan.status.claims.contains_namespace("gone"));
        assert_eq!(plan.status.allocation.claimed, list(&[("cpu", "1")]));
        assert_eq!(plan.status.namespaces, members(&["a"]));
    }

    #[test]
    fn test_deleting_pool_drains_ledger() {
        let config = ResourcePoolConfig {
            delete_bound_resources: true,
            ..Default::default()
        };
        let mut pool = make_pool(&[("cpu", "4")], config);
        pool.deletion_timestamp = Some(Utc::now());
        let bound = make_claim("a", "bound", 1, &[("cpu", "1")]);
        let mut released = make_claim("a", "released", 2, &[("cpu", "1")]);
        released
            .annotations
            .insert(RELEASE_ANNOTATION.into(), "true".into());
        pool.status.claims.upsert("a", bound.to_claim_item());
        pool.status.claims.upsert("a", released.to_claim_item());
        pool.status.assign_namespaces(members(&["a"]));

        let plan = plan_pass(&pool, &members(&["a"]), &[bound, released]);
        assert!(plan.drained());
        assert_eq!(plan.evicted[0].action, Eviction::Delete);
        assert_eq!(plan.evicted[1].action, Eviction::Disassociate);
        assert_eq!(plan.departed_namespaces, members(&["a"]));
        assert_eq!(plan.status.namespace_count, 0);
    }

    #[test]
    fn test_foreign_claims_are_ignored() {
        let pool = make_pool(&[("cpu", "4")], ResourcePoolConfig::default());
        let mut foreign = make_claim("a", "other-pool", 1, &[("cpu", "1")]);
        foreign.status.pool = Some(pkg_types::PoolReference {
            name: "other".into(),
            uid: "other-uid".into(),
        });
        let outsider = make_claim("z", "outsider", 1, &[("cpu", "1")]);
        let plan = plan_pass(&pool, &members(&["a"]), &[foreign, outsider]);
        assert!(plan.outcomes.is_empty());
        assert!(plan.status.claims.is_empty());
    }

    #[test]
    fn test_hard_reduction_reports_negative_headroom() {
        let mut pool = make_pool(&[("cpu", "1")], ResourcePoolConfig::default());
        let claim = make_claim("a", "c1", 1, &[("cpu", "2")]);
        pool.status.claims.upsert("a", claim.to_claim_item());
        let plan = plan_pass(&pool, &members(&["a"]), &[claim]);
        assert_eq!(plan.outcomes[0].decision, ClaimDecision::Held);
        assert_eq!(plan.status.allocation.available["cpu"], "-1".parse().unwrap());
    }
}

//! Pure accounting over a pool's ledger: aggregates, per-namespace sums and
//! the admission check. Nothing here touches the store.

use pkg_types::ledger::{ClaimItem, ClaimLedger};
use pkg_types::pool::{PoolAllocation, PoolExhaustion, ResourcePoolConfig};
use pkg_types::{Quantity, ResourceList};
use std::collections::BTreeMap;

use crate::error::{ResourceViolation, ViolationKind};

/// Exhaustions recorded during a pool pass, keyed by resource.
pub type ExhaustionMap = BTreeMap<String, PoolExhaustion>;

/// How a claim competes with other pending claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdmissionPolicy {
    /// Every claim is checked on its own against current headroom.
    #[default]
    FirstFit,
    /// A resource some older claim is waiting for stays reserved for it.
    Ordered,
}

impl AdmissionPolicy {
    pub fn for_config(config: &ResourcePoolConfig) -> Self {
        if config.ordered_queue {
            AdmissionPolicy::Ordered
        } else {
            AdmissionPolicy::FirstFit
        }
    }
}

/// Sum of every ledger entry, tracked only for resources declared in `hard`.
pub fn recalculate_claimed(hard: &ResourceList, ledger: &ClaimLedger) -> ResourceList {
    let mut claimed: ResourceList = hard.keys().map(|r| (r.clone(), Quantity::zero())).collect();
    for (_, item) in ledger.iter() {
        for (resource, amount) in &item.claims {
            if let Some(total) = claimed.get_mut(resource) {
                *total += *amount;
            }
        }
    }
    claimed
}

/// `hard - claimed` per declared resource. Negative results are kept.
pub fn recalculate_available(hard: &ResourceList, claimed: &ResourceList) -> ResourceList {
    hard.iter()
        .map(|(resource, limit)| {
            let used = claimed.get(resource).copied().unwrap_or_default();
            (resource.clone(), *limit - used)
        })
        .collect()
}

/// Refresh `claimed` and `available` from `allocation.hard` and the whole
/// ledger.
pub fn recalculate(allocation: &mut PoolAllocation, ledger: &ClaimLedger) {
    allocation.claimed = recalculate_claimed(&allocation.hard, ledger);
    allocation.available = recalculate_available(&allocation.hard, &allocation.claimed);
}

/// Headroom a claim may use when it already holds a grant: its own
/// previous amounts are handed back before the check.
pub fn headroom_for(available: &ResourceList, existing: Option<&ClaimItem>) -> ResourceList {
    let mut headroom = available.clone();
    if let Some(item) = existing {
        for (resource, amount) in &item.claims {
            if let Some(free) = headroom.get_mut(resource) {
                *free += *amount;
            }
        }
    }
    headroom
}

/// Check a request against `available`. Returns every violated resource;
/// empty means the request fits.
///
/// A resource fails when the pool does not declare it, when its headroom is
/// zero, or when the headroom is smaller than the request. Under
/// [`AdmissionPolicy::Ordered`] a resource also fails when `queue` already
/// holds an exhaustion for it.
pub fn can_claim(
    requested: &ResourceList,
    available: &ResourceList,
    policy: AdmissionPolicy,
    queue: &ExhaustionMap,
) -> Vec<ResourceViolation> {
    let mut violations = Vec::new();
    for (resource, amount) in requested {
        if policy == AdmissionPolicy::Ordered {
            if let Some(waiting) = queue.get(resource) {
                violations.push(ResourceViolation {
                    resource: resource.clone(),
                    requested: *amount,
                    kind: ViolationKind::Queued {
                        queued: waiting.requesting,
                    },
                });
                continue;
            }
        }

        let kind = match available.get(resource) {
            None => ViolationKind::Missing,
            Some(free) if free.is_zero() || free < amount => {
                ViolationKind::Exhausted { available: *free }
            }
            Some(_) => continue,
        };
        violations.push(ResourceViolation {
            resource: resource.clone(),
            requested: *amount,
            kind,
        });
    }
    violations
}

/// Fold a rejected claim into the pass's exhaustions. Resources the claim is
/// only queued on add nothing. Every resource that failed the capacity check
/// adds its request to `requesting`, and `available` keeps the value seen by
/// the first claim that failed on it.
pub fn record_exhaustions(exhaustions: &mut ExhaustionMap, violations: &[ResourceViolation]) {
    for violation in violations.iter().filter(|v| !v.is_queued()) {
        exhaustions
            .entry(violation.resource.clone())
            .and_modify(|e| e.requesting += violation.requested)
            .or_insert_with(|| PoolExhaustion {
                available: violation.available(),
                requesting: violation.requested,
            });
    }
}

pub fn sum_claims<'a>(items: impl IntoIterator<Item = &'a ClaimItem>) -> ResourceList {
    let mut total = ResourceList::new();
    for item in items {
        for (resource, amount) in &item.claims {
            *total.entry(resource.clone()).or_default() += *amount;
        }
    }
    total
}

/// Claims of one namespace keyed by UID, plus their per-resource sum.
pub fn namespace_claims(
    ledger: &ClaimLedger,
    namespace: &str,
) -> (BTreeMap<String, ClaimItem>, ResourceList) {
    let bucket = ledger.bucket(namespace);
    let by_uid = bucket
        .iter()
        .map(|item| (item.uid.clone(), item.clone()))
        .collect();
    (by_uid, sum_claims(bucket))
}

/// Per-resource sums for every namespace in the ledger.
pub fn claimed_by_namespace(ledger: &ClaimLedger) -> BTreeMap<String, ResourceList> {
    ledger
        .namespaces()
        .map(|ns| (ns.to_string(), sum_claims(ledger.bucket(ns))))
        .collect()
}

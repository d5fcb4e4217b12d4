//! Claim status transitions shared by the mutator and the pool pass.

use pkg_constants::conditions::{
    BOUND_CONDITION, EXHAUSTED_CONDITION, SUCCEEDED_REASON,
};
use pkg_state::typed::{self, Versioned};
use pkg_state::ObjectStore;
use pkg_types::claim::{ResourcePoolClaim, ResourcePoolClaimStatus};
use pkg_types::pool::ResourcePool;
use pkg_types::registry::ResourceKind;
use pkg_types::{Condition, ConditionStatus, ResourceList};

use crate::error::{MutationError, ResourceViolation, violation_message, violation_reason};
use crate::retry::{Cancellation, RetryPolicy, retry_on_conflict};

/// Granted: back-reference, granted slice, `Bound=True`, no exhaustion.
pub fn mark_bound(
    status: &mut ResourcePoolClaimStatus,
    pool: &ResourcePool,
    granted: &ResourceList,
    generation: u64,
) -> bool {
    let mut changed = false;
    let reference = Some(pool.reference());
    if status.pool != reference {
        status.pool = reference;
        changed = true;
    }
    if &status.allocation != granted {
        status.allocation = granted.clone();
        changed = true;
    }
    changed |= status.set_condition(
        Condition::new(
            BOUND_CONDITION,
            ConditionStatus::True,
            SUCCEEDED_REASON,
            "Claimed resources",
        )
        .with_generation(generation),
    );
    changed |= status.remove_condition(EXHAUSTED_CONDITION);
    changed
}

/// Rejected: `Bound=False` and `Exhausted=True`, both carrying every
/// violated resource.
pub fn mark_exhausted(
    status: &mut ResourcePoolClaimStatus,
    violations: &[ResourceViolation],
    generation: u64,
) -> bool {
    let reason = violation_reason(violations);
    let message = violation_message(violations);
    let mut changed = status.set_condition(
        Condition::new(BOUND_CONDITION, ConditionStatus::False, reason, message.clone())
            .with_generation(generation),
    );
    changed |= status.set_condition(
        Condition::new(EXHAUSTED_CONDITION, ConditionStatus::True, reason, message)
            .with_generation(generation),
    );
    if !status.allocation.is_empty() {
        status.allocation.clear();
        changed = true;
    }
    changed
}

/// No longer part of any pool ledger.
pub fn mark_unbound(
    status: &mut ResourcePoolClaimStatus,
    reason: &str,
    message: &str,
    generation: u64,
) -> bool {
    let mut changed = false;
    if status.pool.is_some() {
        status.pool = None;
        changed = true;
    }
    if !status.allocation.is_empty() {
        status.allocation.clear();
        changed = true;
    }
    changed |= status.set_condition(
        Condition::new(BOUND_CONDITION, ConditionStatus::False, reason, message)
            .with_generation(generation),
    );
    changed |= status.remove_condition(EXHAUSTED_CONDITION);
    changed
}

/// Read-modify-write a claim's status under compare-and-swap. `update`
/// returns whether it changed anything; unchanged claims are not written.
/// A claim that vanished or was replaced (different UID) is skipped.
/// Returns whether a write happened.
pub async fn update_claim_status<F>(
    store: &dyn ObjectStore,
    policy: &RetryPolicy,
    cancel: &Cancellation,
    namespace: &str,
    name: &str,
    uid: &str,
    update: F,
) -> Result<bool, MutationError>
where
    F: Fn(&ResourcePoolClaim, &mut ResourcePoolClaimStatus) -> bool,
{
    let key = ResourceKind::ResourcePoolClaim.key(namespace, name);
    let key = key.as_str();
    let update = &update;
    retry_on_conflict(policy, cancel, |_| async move {
        let Some(Versioned { version, object: mut claim }) =
            typed::read::<ResourcePoolClaim>(store, key).await?
        else {
            return Ok(false);
        };
        if claim.uid != uid {
            return Ok(false);
        }
        let mut status = claim.status.clone();
        if !update(&claim, &mut status) {
            return Ok(false);
        }
        claim.status = status;
        typed::write(store, key, &claim, Some(version)).await?;
        Ok::<_, MutationError>(true)
    })
    .await
    .map_err(|e| MutationError::from_retry(key, e))
}

//! Read-modify-write of a pool's ledger under optimistic concurrency.
//!
//! Every attempt reads the pool, runs admission against that exact
//! snapshot, stages the ledger change on an owned copy, recomputes the
//! aggregates from the whole ledger and compare-and-swaps the result against
//! the version it read. A conflict restarts from the read.

use pkg_constants::conditions::RELEASED_REASON;
use pkg_state::typed::{self, Versioned};
use pkg_state::ObjectStore;
use pkg_types::claim::ResourcePoolClaim;
use pkg_types::pool::{PoolAllocation, ResourcePool};
use pkg_types::registry::ResourceKind;
use std::sync::Arc;
use tracing::{debug, info};

use crate::allocator::{self, AdmissionPolicy, ExhaustionMap, headroom_for};
use crate::error::MutationError;
use crate::retry::{Cancellation, RetryPolicy, retry_on_conflict};
use crate::status::{mark_bound, mark_unbound};

/// Admission phase: does `claim` fit `pool` as read? Pure.
///
/// A claim that already holds a grant is checked against the headroom plus
/// its own grant, so re-adding it is idempotent and resizing it only needs
/// room for the difference. Under the ordered policy the pool's recorded
/// exhaustions act as the queue, for resources the claim would grow.
pub fn admit(pool: &ResourcePool, claim: &ResourcePoolClaim) -> Result<(), MutationError> {
    let existing = pool.status.claims.get(&claim.namespace, &claim.uid);
    let allocation = current_allocation(pool);
    let headroom = headroom_for(&allocation.available, existing);
    let policy = AdmissionPolicy::for_config(&pool.spec.config);

    let queue: ExhaustionMap = match policy {
        AdmissionPolicy::Ordered => pool
            .status
            .exhaustions
            .iter()
            .filter(|(resource, _)| {
                let requested = claim.spec.resource_claims.get(*resource);
                let held = existing.and_then(|item| item.claims.get(*resource));
                match (requested, held) {
                    (Some(req), Some(held)) => req > held,
                    (Some(_), None) => true,
                    _ => false,
                }
            })
            .map(|(r, e)| (r.clone(), e.clone()))
            .collect(),
        AdmissionPolicy::FirstFit => ExhaustionMap::new(),
    };

    let violations = allocator::can_claim(&claim.spec.resource_claims, &headroom, policy, &queue);
    if violations.is_empty() {
        Ok(())
    } else {
        Err(MutationError::Rejected {
            pool: pool.name.clone(),
            claim: format!("{}/{}", claim.namespace, claim.name),
            violations,
        })
    }
}

/// Stage phase for an add: upsert the claim and recompute, on an owned copy.
pub fn stage_add(mut pool: ResourcePool, claim: &ResourcePoolClaim) -> ResourcePool {
    pool.status
        .claims
        .upsert(&claim.namespace, claim.to_claim_item());
    refresh_aggregates(&mut pool);
    pool
}

/// Stage phase for a removal. `None` when the claim is not in the ledger.
pub fn stage_remove(mut pool: ResourcePool, namespace: &str, uid: &str) -> Option<ResourcePool> {
    pool.status.claims.remove(namespace, uid)?;
    refresh_aggregates(&mut pool);
    Some(pool)
}

/// Aggregates of the ledger against the limits in `spec`. The stored status
/// lags behind a `hard` change until the next pool pass.
fn current_allocation(pool: &ResourcePool) -> PoolAllocation {
    let mut allocation = pool.status.allocation.clone();
    allocation.hard = pool.spec.quota.hard.clone();
    allocator::recalculate(&mut allocation, &pool.status.claims);
    allocation
}

fn refresh_aggregates(pool: &mut ResourcePool) {
    pool.status.allocation.hard = pool.spec.quota.hard.clone();
    let status = &mut pool.status;
    allocator::recalculate(&mut status.allocation, &status.claims);
    status.assign_claims();
}

/// Applies claim additions and removals to pools.
#[derive(Clone)]
pub struct PoolMutator {
    store: Arc<dyn ObjectStore>,
    retry: RetryPolicy,
    cancel: Cancellation,
}

impl PoolMutator {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
            cancel: Cancellation::never(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cancellation(mut self, cancel: Cancellation) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn cancellation(&self) -> &Cancellation {
        &self.cancel
    }

    async fn read_pool(&self, key: &str, name: &str) -> Result<Versioned<ResourcePool>, MutationError> {
        typed::read::<ResourcePool>(self.store.as_ref(), key)
            .await?
            .ok_or_else(|| MutationError::PoolNotFound(name.to_string()))
    }

    /// Commit phase: write the staged pool if nobody wrote since `expected`.
    pub async fn commit(
        &self,
        pool: &ResourcePool,
        expected: u64,
    ) -> Result<u64, MutationError> {
        let key = ResourceKind::ResourcePool.key("", &pool.name);
        Ok(typed::write(self.store.as_ref(), &key, pool, Some(expected)).await?)
    }

    /// Grant `claim` its request from the pool named in its spec, then
    /// mark the claim bound. Returns the committed pool.
    pub async fn add_claim(
        &self,
        claim: &ResourcePoolClaim,
    ) -> Result<Versioned<ResourcePool>, MutationError> {
        let name = claim.spec.pool.as_str();
        let key = ResourceKind::ResourcePool.key("", name);

        let committed = retry_on_conflict(&self.retry, &self.cancel, |attempt| {
            let key = key.as_str();
            async move {
                let current = self.read_pool(key, name).await?;
                if current.object.is_deleting() {
                    return Err(MutationError::PoolDeleting(name.to_string()));
                }
                admit(&current.object, claim)?;

                let unchanged = current
                    .object
                    .status
                    .claims
                    .get(&claim.namespace, &claim.uid)
                    .is_some_and(|item| item.claims == claim.spec.resource_claims);
                if unchanged {
                    debug!(pool = name, claim = %claim.name, "claim already granted");
                    return Ok(current);
                }

                let staged = stage_add(current.object, claim);
                let version = self.commit(&staged, current.version).await?;
                info!(
                    pool = name,
                    namespace = %claim.namespace,
                    claim = %claim.name,
                    attempt,
                    "granted claim"
                );
                Ok(Versioned {
                    version,
                    object: staged,
                })
            }
        })
        .await
        .map_err(|e| MutationError::from_retry(&key, e))?;

        let granted = claim.spec.resource_claims.clone();
        let pool = &committed.object;
        crate::status::update_claim_status(
            self.store.as_ref(),
            &self.retry,
            &self.cancel,
            &claim.namespace,
            &claim.name,
            &claim.uid,
            |current, status| mark_bound(status, pool, &granted, current.generation),
        )
        .await?;

        Ok(committed)
    }

    /// Take `claim` out of its pool's ledger and mark it unbound. Returns
    /// whether the ledger held it.
    pub async fn remove_claim(&self, claim: &ResourcePoolClaim) -> Result<bool, MutationError> {
        let name = claim
            .status
            .pool
            .as_ref()
            .map(|r| r.name.as_str())
            .unwrap_or(claim.spec.pool.as_str());
        let key = ResourceKind::ResourcePool.key("", name);

        let removed = retry_on_conflict(&self.retry, &self.cancel, |_| {
            let key = key.as_str();
            async move {
                let current = match self.read_pool(key, name).await {
                    Ok(current) => current,
                    // Nothing left to release from.
                    Err(MutationError::PoolNotFound(_)) => return Ok(false),
                    Err(e) => return Err(e),
                };
                let Some(staged) = stage_remove(current.object, &claim.namespace, &claim.uid) else {
                    return Ok(false);
                };
                self.commit(&staged, current.version).await?;
                info!(pool = name, namespace = %claim.namespace, claim = %claim.name, "released claim");
                Ok(true)
            }
        })
        .await
        .map_err(|e| MutationError::from_retry(&key, e))?;

        crate::status::update_claim_status(
            self.store.as_ref(),
            &self.retry,
            &self.cancel,
            &claim.namespace,
            &claim.name,
            &claim.uid,
            |current, status| {
                mark_unbound(status, RELEASED_REASON, "Released from pool", current.generation)
            },
        )
        .await?;

        Ok(removed)
    }
}

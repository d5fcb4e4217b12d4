use pkg_allocation::status::{mark_exhausted, mark_unbound, update_claim_status};
use pkg_allocation::{Cancellation, MutationError, PoolMutator, RetryPolicy};
use pkg_constants::conditions::{
    ASSIGNED_CONDITION, BOUND_CONDITION, FAILED_REASON, READY_CONDITION, RELEASED_REASON,
    SUCCEEDED_REASON,
};
use pkg_constants::pool::CLAIM_RECONCILE_INTERVAL_SECS;
use pkg_metrics::ClaimRecorder;
use pkg_state::ObjectStore;
use pkg_state::typed::{self, Versioned};
use pkg_types::claim::{ResourcePoolClaim, ResourcePoolClaimStatus};
use pkg_types::pool::ResourcePool;
use pkg_types::registry::ResourceKind;
use pkg_types::{Condition, ConditionStatus};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Controller that checks each claim against the pool it names, assigns
/// it, and grants first-fit claims right away through the mutator. Ordered
/// pools are left to the pool pass so creation order is kept.
pub struct ClaimController {
    store: Arc<dyn ObjectStore>,
    mutator: PoolMutator,
    recorder: ClaimRecorder,
    check_interval: Duration,
}

/// Outcome of checking a claim against its pool.
#[derive(Debug, Clone)]
enum Assessment {
    /// The pool can serve the claim.
    Assigned { pool: ResourcePool },
    /// The pool reference itself is unusable.
    NotReady(String),
    /// The pool is fine but cannot serve this claim.
    NotAssigned(String),
}

impl ClaimController {
    pub fn new(store: Arc<dyn ObjectStore>, recorder: ClaimRecorder) -> Self {
        Self {
            mutator: PoolMutator::new(store.clone()),
            store,
            recorder,
            check_interval: Duration::from_secs(CLAIM_RECONCILE_INTERVAL_SECS),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.mutator = self.mutator.with_retry_policy(retry);
        self
    }

    pub fn with_cancellation(mut self, cancel: Cancellation) -> Self {
        self.mutator = self.mutator.with_cancellation(cancel);
        self
    }

    /// Start the controller loop as a background task.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "ClaimController started (interval={}s)",
                self.check_interval.as_secs()
            );
            let prefixes = [
                ResourceKind::ResourcePoolClaim.prefix(None),
                ResourceKind::ResourcePool.prefix(None),
            ];
            let mut event_rx = self.store.event_log().subscribe();
            let mut interval = tokio::time::interval(self.check_interval);
            loop {
                tokio::select! {
                    _ = interval.tick() => self.run_pass().await,
                    result = event_rx.recv() => {
                        match result {
                            Ok(ref event)
                                if prefixes.iter().any(|p| event.key.starts_with(p.as_str())) =>
                            {
                                while event_rx.try_recv().is_ok() {}
                                self.run_pass().await;
                                while event_rx.try_recv().is_ok() {}
                                interval.reset();
                            }
                            Ok(_) => {}
                            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                                self.run_pass().await;
                                interval.reset();
                            }
                            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                        }
                    }
                }
            }
        })
    }

    async fn run_pass(&self) {
        if self.mutator.cancellation().is_cancelled() {
            return;
        }
        if let Err(e) = self.reconcile().await {
            warn!("ClaimController reconcile error: {}", e);
        }
    }

    async fn reconcile(&self) -> anyhow::Result<()> {
        let claims = typed::list::<ResourcePoolClaim>(
            self.store.as_ref(),
            &ResourceKind::ResourcePoolClaim.prefix(None),
        )
        .await?;

        let mut live = Vec::with_capacity(claims.len());
        for Versioned { object: claim, .. } in claims {
            live.push((claim.namespace.clone(), claim.name.clone()));
            match self.reconcile_claim(&claim).await {
                Ok(()) => {}
                Err(MutationError::Cancelled) => return Ok(()),
                Err(e) => warn!(
                    namespace = %claim.namespace,
                    claim = %claim.name,
                    "ClaimController reconcile error: {}", e
                ),
            }
        }
        self.recorder.retain(&live);
        Ok(())
    }

    async fn reconcile_claim(&self, claim: &ResourcePoolClaim) -> Result<(), MutationError> {
        if claim.is_released() {
            return self.release(claim).await;
        }

        let assessment = self.assess(claim).await?;
        self.write_status(claim, |status, generation| {
            apply_assessment(status, &assessment, generation)
        })
        .await?;

        if let Assessment::Assigned { pool } = &assessment
            && !claim.is_bound()
            && !pool.spec.config.ordered_queue
        {
            self.grant(claim).await?;
        }

        self.recorder.record(claim);
        Ok(())
    }

    /// Hand the claim's grant back. A claim no pool knows about is only
    /// marked released.
    async fn release(&self, claim: &ResourcePoolClaim) -> Result<(), MutationError> {
        if claim.status.pool.is_some() || !claim.spec.pool.is_empty() {
            if self.mutator.remove_claim(claim).await? {
                info!(namespace = %claim.namespace, claim = %claim.name, "claim released");
            }
        } else {
            self.write_status(claim, |status, generation| {
                mark_unbound(status, RELEASED_REASON, "Released from pool", generation)
            })
            .await?;
        }
        self.recorder.record(claim);
        Ok(())
    }

    async fn grant(&self, claim: &ResourcePoolClaim) -> Result<(), MutationError> {
        match self.mutator.add_claim(claim).await {
            Ok(_) => {
                self.recorder.granted();
                Ok(())
            }
            Err(MutationError::Rejected { violations, .. }) => {
                self.recorder.rejected();
                debug!(
                    namespace = %claim.namespace,
                    claim = %claim.name,
                    violations = violations.len(),
                    "claim does not fit its pool"
                );
                self.write_status(claim, |status, generation| {
                    mark_exhausted(status, &violations, generation)
                })
                .await
            }
            // Raced with deletion; the next pass reports it.
            Err(MutationError::PoolNotFound(_) | MutationError::PoolDeleting(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Check the pool the claim names.
    async fn assess(&self, claim: &ResourcePoolClaim) -> Result<Assessment, MutationError> {
        let name = claim.spec.pool.as_str();
        if name.is_empty() {
            return Ok(Assessment::NotReady("No pool specified".to_string()));
        }
        if claim.is_bound()
            && let Some(current) = &claim.status.pool
            && current.name != name
        {
            return Ok(Assessment::NotReady(format!(
                "Claim is bound to pool {} and cannot move to {}",
                current.name, name
            )));
        }

        let key = ResourceKind::ResourcePool.key("", name);
        let Some(Versioned { object: pool, .. }) =
            typed::read::<ResourcePool>(self.store.as_ref(), &key).await?
        else {
            return Ok(Assessment::NotReady(format!("Pool {} not found", name)));
        };
        if pool.is_deleting() {
            return Ok(Assessment::NotReady(format!("Pool {} is being deleted", name)));
        }
        if !pool.has_namespace(&claim.namespace) {
            return Ok(Assessment::NotAssigned(format!(
                "Namespace {} is not selected by pool {}",
                claim.namespace, name
            )));
        }
        if let Some(resource) = claim
            .spec
            .resource_claims
            .keys()
            .find(|r| !pool.spec.quota.hard.contains_key(*r))
        {
            return Ok(Assessment::NotAssigned(format!(
                "Pool {} does not provide {}",
                name, resource
            )));
        }
        Ok(Assessment::Assigned { pool })
    }

    async fn write_status<F>(&self, claim: &ResourcePoolClaim, update: F) -> Result<(), MutationError>
    where
        F: Fn(&mut ResourcePoolClaimStatus, u64) -> bool,
    {
        update_claim_status(
            self.store.as_ref(),
            self.mutator.retry_policy(),
            self.mutator.cancellation(),
            &claim.namespace,
            &claim.name,
            &claim.uid,
            |current, status| update(status, current.generation),
        )
        .await?;
        Ok(())
    }
}

/// Ready and Assigned conditions plus the pool back-reference. A bound
/// claim keeps its reference; the pool pass decides when it leaves.
fn apply_assessment(
    status: &mut ResourcePoolClaimStatus,
    assessment: &Assessment,
    generation: u64,
) -> bool {
    let bound = status.conditions.is_true(BOUND_CONDITION);
    let condition = |type_: &str, ok: bool, message: &str| {
        let (state, reason) = if ok {
            (ConditionStatus::True, SUCCEEDED_REASON)
        } else {
            (ConditionStatus::False, FAILED_REASON)
        };
        Condition::new(type_, state, reason, message).with_generation(generation)
    };

    let mut changed = false;
    let reference = match assessment {
        Assessment::Assigned { pool } => {
            changed |= status.set_condition(condition(READY_CONDITION, true, "Pool is ready"));
            changed |= status.set_condition(condition(
                ASSIGNED_CONDITION,
                true,
                &format!("Assigned to pool {}", pool.name),
            ));
            Some(pool.reference())
        }
        Assessment::NotReady(message) => {
            changed |= status.set_condition(condition(READY_CONDITION, false, message));
            changed |= status.remove_condition(ASSIGNED_CONDITION);
            None
        }
        Assessment::NotAssigned(message) => {
            changed |= status.set_condition(condition(READY_CONDITION, true, "Pool is ready"));
            changed |= status.set_condition(condition(ASSIGNED_CONDITION, false, message));
            None
        }
    };
    if !bound && status.pool != reference {
        status.pool = reference;
        changed = true;
    }
    changed
}

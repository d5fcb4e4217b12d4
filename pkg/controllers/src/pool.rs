use pkg_allocation::planner::{ClaimDecision, EvictedClaim, PoolPlan};
use pkg_allocation::status::{mark_bound, mark_exhausted, mark_unbound, update_claim_status};
use pkg_allocation::{
    Cancellation, Eviction, NamespaceResolver, QuotaWriter, RetryPolicy, plan_pass, projector,
    retry_on_conflict,
};
use pkg_constants::conditions::{DISASSOCIATED_REASON, RELEASED_REASON};
use pkg_constants::pool::POOL_RECONCILE_INTERVAL_SECS;
use pkg_metrics::PoolRecorder;
use pkg_state::ObjectStore;
use pkg_state::typed::{self, Versioned};
use pkg_types::claim::ResourcePoolClaim;
use pkg_types::pool::ResourcePool;
use pkg_types::registry::ResourceKind;
use pkg_types::ResourceQuota;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::backend::{StoreNamespaceResolver, StoreQuotaWriter};

/// Controller that runs the full pool pass: membership, ledger garbage
/// collection, queued admission, aggregates, claim conditions and quota
/// projection. Also finishes pool deletion once the ledger drains.
pub struct PoolController {
    store: Arc<dyn ObjectStore>,
    resolver: Arc<dyn NamespaceResolver>,
    quotas: Arc<dyn QuotaWriter>,
    recorder: PoolRecorder,
    retry: RetryPolicy,
    cancel: Cancellation,
    check_interval: Duration,
}

/// What one committed pass produced.
struct Committed {
    pool: Versioned<ResourcePool>,
    plan: PoolPlan,
    claims: Vec<ResourcePoolClaim>,
}

impl PoolController {
    pub fn new(store: Arc<dyn ObjectStore>, recorder: PoolRecorder) -> Self {
        Self {
            resolver: Arc::new(StoreNamespaceResolver::new(store.clone())),
            quotas: Arc::new(StoreQuotaWriter::new(store.clone())),
            store,
            recorder,
            retry: RetryPolicy::default(),
            cancel: Cancellation::never(),
            check_interval: Duration::from_secs(POOL_RECONCILE_INTERVAL_SECS),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Passes are skipped while `cancel` is set; in-flight retries stop.
    pub fn with_cancellation(mut self, cancel: Cancellation) -> Self {
        self.cancel = cancel;
        self
    }

    /// Start the controller loop as a background task.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "PoolController started (interval={}s)",
                self.check_interval.as_secs()
            );
            let prefixes = [
                ResourceKind::ResourcePool.prefix(None),
                ResourceKind::ResourcePoolClaim.prefix(None),
                ResourceKind::Namespace.prefix(None),
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
        if self.cancel.is_cancelled() {
            return;
        }
        if let Err(e) = self.reconcile().await {
            warn!("PoolController reconcile error: {}", e);
        }
    }

    /// One pass over every pool. A failing pool is logged and the rest
    /// still run.
    async fn reconcile(&self) -> anyhow::Result<()> {
        let pools = typed::list::<ResourcePool>(
            self.store.as_ref(),
            &ResourceKind::ResourcePool.prefix(None),
        )
        .await?;
        for Versioned { object: pool, .. } in pools {
            if self.cancel.is_cancelled() {
                break;
            }
            let result = self.reconcile_pool(&pool.name).await;
            self.recorder.reconciled(result.is_ok());
            if let Err(e) = result {
                warn!(pool = %pool.name, "PoolController reconcile error: {}", e);
            }
        }
        Ok(())
    }

    async fn reconcile_pool(&self, name: &str) -> anyhow::Result<()> {
        let key = ResourceKind::ResourcePool.key("", name);
        let Some(committed) = self.commit_pass(&key).await? else {
            self.recorder.forget(name);
            return Ok(());
        };
        let Committed { pool, plan, claims } = committed;

        self.apply_outcomes(&pool.object, &plan).await?;
        self.apply_evictions(&plan.evicted, &claims).await?;

        projector::project(self.quotas.as_ref(), &pool.object, &pool.object.status.namespaces).await?;
        projector::retract(self.quotas.as_ref(), &pool.object, &plan.departed_namespaces).await?;

        if pool.object.is_deleting() && plan.drained() {
            self.finish_deletion(&key, &pool).await?;
            return Ok(());
        }

        self.recorder.record(&pool.object);
        Ok(())
    }

    /// Plan on a fresh read and compare-and-swap the status. Nothing is
    /// written when the plan leaves the status as it was.
    async fn commit_pass(&self, key: &str) -> anyhow::Result<Option<Committed>> {
        let store = self.store.as_ref();
        retry_on_conflict(&self.retry, &self.cancel, |attempt| async move {
            let Some(Versioned { version, object: mut pool }) =
                typed::read::<ResourcePool>(store, key).await?
            else {
                return Ok(None);
            };
            let namespaces = if pool.is_deleting() {
                Vec::new()
            } else {
                self.resolver.resolve(&pool.spec.selectors).await?
            };
            let claims: Vec<ResourcePoolClaim> = typed::list::<ResourcePoolClaim>(
                store,
                &ResourceKind::ResourcePoolClaim.prefix(None),
            )
            .await?
            .into_iter()
            .map(|v| v.object)
            .collect();

            let plan = plan_pass(&pool, &namespaces, &claims);
            let version = if plan.status != pool.status {
                pool.status = plan.status.clone();
                let version = typed::write(store, key, &pool, Some(version)).await?;
                debug!(
                    pool = %pool.name,
                    attempt,
                    claims = pool.status.claim_count,
                    namespaces = pool.status.namespace_count,
                    "pool status updated"
                );
                version
            } else {
                version
            };
            Ok::<_, anyhow::Error>(Some(Committed {
                pool: Versioned { version, object: pool },
                plan,
                claims,
            }))
        })
        .await
        .map_err(|e| e.into_anyhow(key))
    }

    /// Mirror each evaluated claim's decision onto its conditions.
    async fn apply_outcomes(&self, pool: &ResourcePool, plan: &PoolPlan) -> anyhow::Result<()> {
        for outcome in &plan.outcomes {
            let store = self.store.as_ref();
            match &outcome.decision {
                ClaimDecision::Granted | ClaimDecision::Held => {
                    let Some(item) = pool.status.claims.get(&outcome.namespace, &outcome.uid) else {
                        continue;
                    };
                    if outcome.decision == ClaimDecision::Granted {
                        info!(
                            pool = %pool.name,
                            namespace = %outcome.namespace,
                            claim = %outcome.name,
                            "granted queued claim"
                        );
                    }
                    let granted = &item.claims;
                    update_claim_status(
                        store,
                        &self.retry,
                        &self.cancel,
                        &outcome.namespace,
                        &outcome.name,
                        &outcome.uid,
                        |claim, status| mark_bound(status, pool, granted, claim.generation),
                    )
                    .await?;
                }
                ClaimDecision::Rejected(violations) => {
                    update_claim_status(
                        store,
                        &self.retry,
                        &self.cancel,
                        &outcome.namespace,
                        &outcome.name,
                        &outcome.uid,
                        |claim, status| mark_exhausted(status, violations, claim.generation),
                    )
                    .await?;
                }
            }
        }
        Ok(())
    }

    async fn apply_evictions(
        &self,
        evicted: &[EvictedClaim],
        claims: &[ResourcePoolClaim],
    ) -> anyhow::Result<()> {
        for eviction in evicted {
            let namespace = eviction.namespace.as_str();
            let item = &eviction.item;
            match eviction.action {
                Eviction::Delete => {
                    let key = ResourceKind::ResourcePoolClaim.key(namespace, &item.name);
                    if let Some(current) =
                        typed::read::<ResourcePoolClaim>(self.store.as_ref(), &key).await?
                        && current.object.uid == item.uid
                    {
                        self.store.delete(&key, Some(current.version)).await?;
                        info!(namespace, claim = %item.name, "deleted claim of removed pool");
                    }
                }
                Eviction::Disassociate => {
                    let released = claims
                        .iter()
                        .any(|c| c.uid == item.uid && c.is_released());
                    let (reason, message) = if released {
                        (RELEASED_REASON, "Released from pool")
                    } else {
                        (DISASSOCIATED_REASON, "Claim is disassociated from the pool")
                    };
                    let written = update_claim_status(
                        self.store.as_ref(),
                        &self.retry,
                        &self.cancel,
                        namespace,
                        &item.name,
                        &item.uid,
                        |claim, status| mark_unbound(status, reason, message, claim.generation),
                    )
                    .await?;
                    if written {
                        info!(namespace, claim = %item.name, reason, "claim left pool ledger");
                    }
                }
            }
        }
        Ok(())
    }

    /// Remove a drained pool together with any quota it still owns.
    async fn finish_deletion(&self, key: &str, pool: &Versioned<ResourcePool>) -> anyhow::Result<()> {
        let quotas = typed::list::<ResourceQuota>(
            self.store.as_ref(),
            &ResourceKind::ResourceQuota.prefix(None),
        )
        .await?;
        let owned: BTreeSet<String> = quotas
            .into_iter()
            .filter(|q| q.object.owner.as_ref().is_some_and(|o| o.uid == pool.object.uid))
            .map(|q| q.object.namespace)
            .collect();
        for namespace in &owned {
            self.quotas.delete(&pool.object, namespace).await?;
        }

        match self.store.delete(key, Some(pool.version)).await {
            Ok(_) => {
                info!(pool = %pool.object.name, "deleted drained pool");
                self.recorder.forget(&pool.object.name);
                Ok(())
            }
            // Written since the pass; the next pass retries.
            Err(e) if e.is_conflict() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

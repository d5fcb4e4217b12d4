use pkg_types::claim::ResourcePoolClaim;
use pkg_types::pool::ResourcePool;
use std::sync::Arc;

use crate::registry::{Labels, MetricsRegistry};

pub const POOL_HARD: &str = "poolrs_pool_resource_hard";
pub const POOL_CLAIMED: &str = "poolrs_pool_resource_claimed";
pub const POOL_AVAILABLE: &str = "poolrs_pool_resource_available";
pub const POOL_OVERCOMMITTED: &str = "poolrs_pool_resource_overcommitted";
pub const POOL_EXHAUSTION: &str = "poolrs_pool_resource_exhaustion";
pub const POOL_NAMESPACES: &str = "poolrs_pool_namespaces";
pub const POOL_CLAIMS: &str = "poolrs_pool_claims";
pub const POOL_RECONCILES: &str = "poolrs_pool_reconciles_total";
pub const POOL_RECONCILE_ERRORS: &str = "poolrs_pool_reconcile_errors_total";
pub const CLAIM_BOUND: &str = "poolrs_claim_bound";
pub const CLAIMS_GRANTED: &str = "poolrs_claims_granted_total";
pub const CLAIMS_REJECTED: &str = "poolrs_claims_rejected_total";

/// Per-pool gauges derived from a pool's status.
#[derive(Clone)]
pub struct PoolRecorder {
    registry: Arc<MetricsRegistry>,
}

impl PoolRecorder {
    pub fn new(registry: Arc<MetricsRegistry>) -> Self {
        registry.register_gauge(POOL_HARD, "Hard limit of a pool resource");
        registry.register_gauge(POOL_CLAIMED, "Amount of a pool resource granted to claims");
        registry.register_gauge(POOL_AVAILABLE, "Unclaimed amount of a pool resource, floored at zero");
        registry.register_gauge(POOL_OVERCOMMITTED, "Amount by which claims exceed the hard limit");
        registry.register_gauge(POOL_EXHAUSTION, "Amount requested by claims the pool could not admit");
        registry.register_gauge(POOL_NAMESPACES, "Namespaces selected by a pool");
        registry.register_gauge(POOL_CLAIMS, "Claims bound to a pool");
        registry.register_counter(POOL_RECONCILES, "Pool reconcile passes");
        registry.register_counter(POOL_RECONCILE_ERRORS, "Pool reconcile passes that failed");
        Self { registry }
    }

    /// Replace every series of this pool with values from its status.
    pub fn record(&self, pool: &ResourcePool) {
        let name = pool.name.as_str();
        self.registry.gauge_remove_matching("pool", name);

        let allocation = &pool.status.allocation;
        for (resource, hard) in &allocation.hard {
            let labels = [("pool", name), ("resource", resource.as_str())];
            self.registry
                .gauge_set(POOL_HARD, &labels, hard.as_approximate_f64());
            if let Some(claimed) = allocation.claimed.get(resource) {
                self.registry
                    .gauge_set(POOL_CLAIMED, &labels, claimed.as_approximate_f64());
            }
            if let Some(available) = allocation.available.get(resource) {
                self.registry
                    .gauge_set(POOL_AVAILABLE, &labels, available.clamp_zero().as_approximate_f64());
                let over = if available.is_negative() {
                    -available.as_approximate_f64()
                } else {
                    0.0
                };
                self.registry.gauge_set(POOL_OVERCOMMITTED, &labels, over);
            }
        }
        for (resource, exhaustion) in &pool.status.exhaustions {
            self.registry.gauge_set(
                POOL_EXHAUSTION,
                &[("pool", name), ("resource", resource.as_str())],
                exhaustion.requesting.as_approximate_f64(),
            );
        }
        self.registry
            .gauge_set(POOL_NAMESPACES, &[("pool", name)], pool.status.namespace_count as f64);
        self.registry
            .gauge_set(POOL_CLAIMS, &[("pool", name)], pool.status.claim_count as f64);
    }

    pub fn forget(&self, pool_name: &str) {
        self.registry.gauge_remove_matching("pool", pool_name);
    }

    pub fn reconciled(&self, ok: bool) {
        self.registry.counter_inc(POOL_RECONCILES);
        if !ok {
            self.registry.counter_inc(POOL_RECONCILE_ERRORS);
        }
    }
}

/// Per-claim binding state and admission counters.
#[derive(Clone)]
pub struct ClaimRecorder {
    registry: Arc<MetricsRegistry>,
}

impl ClaimRecorder {
    pub fn new(registry: Arc<MetricsRegistry>) -> Self {
        registry.register_gauge(CLAIM_BOUND, "1 when a claim is bound to its pool");
        registry.register_counter(CLAIMS_GRANTED, "Claims granted by a pool");
        registry.register_counter(CLAIMS_REJECTED, "Claim admissions rejected for lack of capacity");
        Self { registry }
    }

    pub fn record(&self, claim: &ResourcePoolClaim) {
        let value = if claim.is_bound() { 1.0 } else { 0.0 };
        self.registry.gauge_set(
            CLAIM_BOUND,
            &[
                ("namespace", claim.namespace.as_str()),
                ("claim", claim.name.as_str()),
                ("pool", claim.spec.pool.as_str()),
            ],
            value,
        );
    }

    /// Drop series of claims not in `live` (`(namespace, name)` pairs).
    pub fn retain(&self, live: &[(String, String)]) {
        self.registry.gauge_retain(CLAIM_BOUND, |labels: &Labels| {
            let get = |key: &str| {
                labels
                    .iter()
                    .find(|(k, _)| k == key)
                    .map(|(_, v)| v.as_str())
                    .unwrap_or_default()
            };
            live.iter()
                .any(|(ns, name)| ns == get("namespace") && name == get("claim"))
        });
    }

    pub fn granted(&self) {
        self.registry.counter_inc(CLAIMS_GRANTED);
    }

    pub fn rejected(&self) {
        self.registry.counter_inc(CLAIMS_REJECTED);
    }
}

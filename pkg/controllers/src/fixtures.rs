//! Store fixtures shared by the controller tests.

use chrono::{TimeZone, Utc};
use pkg_state::typed;
use pkg_state::{MemoryStore, ObjectStore};
use pkg_types::claim::{ResourcePoolClaim, ResourcePoolClaimSpec, ResourcePoolClaimStatus};
use pkg_types::namespace::Namespace;
use pkg_types::pool::{PoolQuota, ResourcePool, ResourcePoolConfig, ResourcePoolSpec, ResourcePoolStatus};
use pkg_types::registry::ResourceKind;
use pkg_types::resources::parse_resource_list;
use pkg_types::selector::NamespaceSelector;
use pkg_types::{ResourceList, ResourceQuota};
use std::collections::BTreeMap;
use std::sync::Arc;

pub fn make_store() -> Arc<dyn ObjectStore> {
    Arc::new(MemoryStore::new())
}

pub fn list(pairs: &[(&str, &str)]) -> ResourceList {
    parse_resource_list(pairs).unwrap()
}

/// Pool selecting namespaces labelled `tenant=solar`.
pub fn make_pool(name: &str, hard: &[(&str, &str)], config: ResourcePoolConfig) -> ResourcePool {
    ResourcePool {
        uid: format!("{}-uid", name),
        name: name.to_string(),
        labels: BTreeMap::new(),
        generation: 1,
        created_at: Utc::now(),
        deletion_timestamp: None,
        spec: ResourcePoolSpec {
            selectors: vec![NamespaceSelector {
                match_labels: BTreeMap::from([("tenant".to_string(), "solar".to_string())]),
                match_names: vec![],
            }],
            quota: PoolQuota { hard: list(hard) },
            defaults: ResourceList::new(),
            config,
        },
        status: ResourcePoolStatus::default(),
    }
}

pub fn make_claim(name: &str, ns: &str, pool: &str, claims: &[(&str, &str)], created_secs: i64) -> ResourcePoolClaim {
    ResourcePoolClaim {
        uid: format!("{}-{}-uid", ns, name),
        name: name.to_string(),
        namespace: ns.to_string(),
        labels: BTreeMap::new(),
        annotations: BTreeMap::new(),
        generation: 1,
        created_at: Utc.timestamp_opt(created_secs, 0).unwrap(),
        spec: ResourcePoolClaimSpec {
            pool: pool.to_string(),
            resource_claims: list(claims),
        },
        status: ResourcePoolClaimStatus::default(),
    }
}

/// A claim the claim controller has already pointed at `pool`.
pub fn make_assigned_claim(
    name: &str,
    ns: &str,
    pool: &ResourcePool,
    claims: &[(&str, &str)],
    created_secs: i64,
) -> ResourcePoolClaim {
    let mut claim = make_claim(name, ns, &pool.name, claims, created_secs);
    claim.status.pool = Some(pool.reference());
    claim
}

pub async fn put_namespace(store: &Arc<dyn ObjectStore>, name: &str, tenant: &str) {
    let mut ns = Namespace::new(name);
    ns.labels.insert("tenant".to_string(), tenant.to_string());
    typed::put(store.as_ref(), &ResourceKind::Namespace.key("", name), &ns)
        .await
        .unwrap();
}

pub async fn put_pool(store: &Arc<dyn ObjectStore>, pool: &ResourcePool) {
    typed::put(store.as_ref(), &ResourceKind::ResourcePool.key("", &pool.name), pool)
        .await
        .unwrap();
}

pub async fn put_claim(store: &Arc<dyn ObjectStore>, claim: &ResourcePoolClaim) {
    let key = ResourceKind::ResourcePoolClaim.key(&claim.namespace, &claim.name);
    typed::put(store.as_ref(), &key, claim).await.unwrap();
}

pub async fn get_pool(store: &Arc<dyn ObjectStore>, name: &str) -> ResourcePool {
    typed::read::<ResourcePool>(store.as_ref(), &ResourceKind::ResourcePool.key("", name))
        .await
        .unwrap()
        .unwrap()
        .object
}

pub async fn get_claim(store: &Arc<dyn ObjectStore>, ns: &str, name: &str) -> ResourcePoolClaim {
    let key = ResourceKind::ResourcePoolClaim.key(ns, name);
    typed::read::<ResourcePoolClaim>(store.as_ref(), &key)
        .await
        .unwrap()
        .unwrap()
        .object
}

pub async fn get_quota(store: &Arc<dyn ObjectStore>, ns: &str, name: &str) -> Option<ResourceQuota> {
    let key = ResourceKind::ResourceQuota.key(ns, name);
    typed::read::<ResourceQuota>(store.as_ref(), &key)
        .await
        .unwrap()
        .map(|v| v.object)
}

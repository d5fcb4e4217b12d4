//! Store-backed implementations of the allocation collaborators.

use async_trait::async_trait;
use chrono::Utc;
use pkg_allocation::{NamespaceResolver, QuotaWriter};
use pkg_constants::pool::POOL_QUOTA_LABEL;
use pkg_state::ObjectStore;
use pkg_state::typed::{self, Versioned};
use pkg_types::namespace::Namespace;
use pkg_types::pool::ResourcePool;
use pkg_types::registry::ResourceKind;
use pkg_types::selector::{NamespaceSelector, select_namespaces};
use pkg_types::{ResourceList, ResourceQuota};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Resolves selectors against the namespaces in the store.
pub struct StoreNamespaceResolver {
    store: Arc<dyn ObjectStore>,
}

impl StoreNamespaceResolver {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl NamespaceResolver for StoreNamespaceResolver {
    async fn resolve(&self, selectors: &[NamespaceSelector]) -> anyhow::Result<Vec<String>> {
        let namespaces: Vec<Namespace> = typed::list::<Namespace>(
            self.store.as_ref(),
            &ResourceKind::Namespace.prefix(None),
        )
        .await?
        .into_iter()
        .map(|v| v.object)
        .collect();
        Ok(select_namespaces(selectors, &namespaces))
    }
}

/// Writes one `ResourceQuota` per (pool, namespace), named after the pool
/// and labelled with its name.
pub struct StoreQuotaWriter {
    store: Arc<dyn ObjectStore>,
}

impl StoreQuotaWriter {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl QuotaWriter for StoreQuotaWriter {
    async fn upsert(&self, pool: &ResourcePool, namespace: &str, hard: ResourceList) -> anyhow::Result<()> {
        let name = pool.quota_name();
        let key = ResourceKind::ResourceQuota.key(namespace, &name);
        let current = typed::read::<ResourceQuota>(self.store.as_ref(), &key).await?;

        let (quota, expected) = match current {
            Some(Versioned { object, .. })
                if object.hard == hard && object.owner.as_ref() == Some(&pool.reference()) =>
            {
                return Ok(());
            }
            Some(Versioned { version, object }) => (
                ResourceQuota {
                    hard,
                    owner: Some(pool.reference()),
                    updated_at: Some(Utc::now()),
                    ..object
                },
                Some(version),
            ),
            None => (
                ResourceQuota {
                    name,
                    namespace: namespace.to_string(),
                    labels: BTreeMap::from([(POOL_QUOTA_LABEL.to_string(), pool.name.clone())]),
                    hard,
                    owner: Some(pool.reference()),
                    created_at: Utc::now(),
                    updated_at: None,
                },
                None,
            ),
        };

        typed::write(self.store.as_ref(), &key, &quota, expected).await?;
        debug!(pool = %pool.name, namespace, "projected quota");
        Ok(())
    }

    async fn delete(&self, pool: &ResourcePool, namespace: &str) -> anyhow::Result<()> {
        let key = ResourceKind::ResourceQuota.key(namespace, &pool.quota_name());
        if self.store.delete(&key, None).await? {
            debug!(pool = %pool.name, namespace, "removed projected quota");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkg_state::MemoryStore;
    use pkg_types::namespace::NamespacePhase;
    use pkg_types::pool::{PoolQuota, ResourcePoolSpec, ResourcePoolStatus};
    use pkg_types::resources::parse_resource_list;

    fn make_pool() -> ResourcePool {
        ResourcePool {
            uid: "pool-uid".into(),
            name: "shared".into(),
            labels: BTreeMap::new(),
            generation: 1,
            created_at: Utc::now(),
            deletion_timestamp: None,
            spec: ResourcePoolSpec {
                selectors: vec![],
                quota: PoolQuota::default(),
                defaults: ResourceList::new(),
                config: Default::default(),
            },
            status: ResourcePoolStatus::default(),
        }
    }

    #[tokio::test]
    async fn test_resolver_skips_terminating_namespaces() {
        let store = Arc::new(MemoryStore::new());
        let mut solar = Namespace::new("solar-dev");
        solar.labels.insert("tenant".into(), "solar".into());
        let mut gone = Namespace::new("solar-old");
        gone.labels.insert("tenant".into(), "solar".into());
        gone.phase = NamespacePhase::Terminating;
        for ns in [&solar, &gone, &Namespace::new("other")] {
            typed::put(store.as_ref(), &ResourceKind::Namespace.key("", &ns.name), ns)
                .await
                .unwrap();
        }

        let resolver = StoreNamespaceResolver::new(store);
        let selector = NamespaceSelector {
            match_labels: BTreeMap::from([("tenant".to_string(), "solar".to_string())]),
            match_names: vec![],
        };
        let names = resolver.resolve(&[selector]).await.unwrap();
        assert_eq!(names, vec!["solar-dev".to_string()]);
    }

    #[tokio::test]
    async fn test_quota_writer_upserts_without_churn() {
        let store = Arc::new(MemoryStore::new());
        let writer = StoreQuotaWriter::new(store.clone());
        let pool = make_pool();
        let key = ResourceKind::ResourceQuota.key("team-a", "poolrs-pool-shared");

        let hard = parse_resource_list(&[("requests.cpu", "2")]).unwrap();
        writer.upsert(&pool, "team-a", hard.clone()).await.unwrap();
        let first = typed::read::<ResourceQuota>(store.as_ref(), &key)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.object.labels[POOL_QUOTA_LABEL], "shared");
        assert_eq!(first.object.owner, Some(pool.reference()));

        // Same limits: no write.
        writer.upsert(&pool, "team-a", hard).await.unwrap();
        let second = typed::read::<ResourceQuota>(store.as_ref(), &key)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.version, first.version);

        writer
            .upsert(&pool, "team-a", parse_resource_list(&[("requests.cpu", "3")]).unwrap())
            .await
            .unwrap();
        let third = typed::read::<ResourceQuota>(store.as_ref(), &key)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(third.object.hard["requests.cpu"].to_string(), "3");
        assert_eq!(third.object.created_at, first.object.created_at);

        writer.delete(&pool, "team-a").await.unwrap();
        assert!(store.get(&key).await.unwrap().is_none());
        // Deleting twice is fine.
        writer.delete(&pool, "team-a").await.unwrap();
    }
}

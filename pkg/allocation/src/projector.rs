//! Projection of a pool onto the per-namespace quota objects.

use async_trait::async_trait;
use pkg_types::pool::{ResourcePool, ResourcePoolSpec};
use pkg_types::selector::NamespaceSelector;
use pkg_types::{Quantity, ResourceList};

use crate::allocator::namespace_claims;

/// Turns a pool's selectors into member namespace names.
#[async_trait]
pub trait NamespaceResolver: Send + Sync {
    /// Active member namespaces, sorted and without duplicates.
    async fn resolve(&self, selectors: &[NamespaceSelector]) -> anyhow::Result<Vec<String>>;
}

/// Writes the per-namespace quota objects a pool projects.
#[async_trait]
pub trait QuotaWriter: Send + Sync {
    async fn upsert(&self, pool: &ResourcePool, namespace: &str, hard: ResourceList) -> anyhow::Result<()>;

    async fn delete(&self, pool: &ResourcePool, namespace: &str) -> anyhow::Result<()>;
}

/// Hard limits for one namespace's quota: what the namespace has claimed,
/// minus resources claimed at exactly zero, plus every pool default.
/// Defaults add on top of claims and never count against the pool.
pub fn effective_hard(pool: &ResourcePool, namespace: &str) -> ResourceList {
    let (_, mut hard) = namespace_claims(&pool.status.claims, namespace);
    hard.retain(|_, amount| !amount.is_zero());
    for (resource, amount) in &pool.spec.defaults {
        *hard.entry(resource.clone()).or_default() += *amount;
    }
    hard
}

/// With `defaultsZero` set, give every hard resource that lacks a default a
/// zero default, so the projected quota always names it. Returns whether
/// the pool spec changed.
pub fn apply_zero_defaults(spec: &mut ResourcePoolSpec) -> bool {
    if !spec.config.defaults_assign_zero {
        return false;
    }
    let mut changed = false;
    for resource in spec.quota.hard.keys() {
        if !spec.defaults.contains_key(resource) {
            spec.defaults.insert(resource.clone(), Quantity::zero());
            changed = true;
        }
    }
    changed
}

/// Write the effective hard limits into every member namespace.
pub async fn project(
    writer: &dyn QuotaWriter,
    pool: &ResourcePool,
    namespaces: &[String],
) -> anyhow::Result<()> {
    for namespace in namespaces {
        writer
            .upsert(pool, namespace, effective_hard(pool, namespace))
            .await?;
    }
    Ok(())
}

/// Remove the pool's quota from namespaces that are no longer members.
pub async fn retract(
    writer: &dyn QuotaWriter,
    pool: &ResourcePool,
    namespaces: &[String],
) -> anyhow::Result<()> {
    for namespace in namespaces {
        writer.delete(pool, namespace).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pkg_types::ledger::ClaimItem;
    use pkg_types::pool::{PoolQuota, ResourcePoolConfig, ResourcePoolStatus};
    use pkg_types::resources::parse_resource_list;
    use std::collections::BTreeMap;
    use tokio::sync::Mutex;

    fn list(pairs: &[(&str, &str)]) -> ResourceList {
        parse_resource_list(pairs).unwrap()
    }

    fn make_pool(hard: &[(&str, &str)], defaults: &[(&str, &str)]) -> ResourcePool {
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
                defaults: list(defaults),
                config: ResourcePoolConfig::default(),
            },
            status: ResourcePoolStatus::default(),
        }
    }

    fn make_item(uid: &str, pairs: &[(&str, &str)]) -> ClaimItem {
        ClaimItem {
            uid: uid.into(),
            name: uid.into(),
            claims: list(pairs),
        }
    }

    #[test]
    fn test_defaults_add_on_top_of_claims() {
        let mut pool = make_pool(&[("cpu", "4")], &[("cpu", "1")]);
        pool.status.claims.upsert("ns", make_item("u1", &[("cpu", "1")]));
        assert_eq!(effective_hard(&pool, "ns"), list(&[("cpu", "2")]));
        // A namespace with no claims still gets the defaults.
        assert_eq!(effective_hard(&pool, "other"), list(&[("cpu", "1")]));
    }

    #[test]
    fn test_zero_claims_are_dropped() {
        let mut pool = make_pool(&[("cpu", "4"), ("mem", "1Gi")], &[]);
        pool.status
            .claims
            .upsert("ns", make_item("u1", &[("cpu", "0"), ("mem", "256Mi")]));
        assert_eq!(effective_hard(&pool, "ns"), list(&[("mem", "256Mi")]));
    }

    #[test]
    fn test_zero_defaults_fill_gaps_only() {
        let mut pool = make_pool(&[("cpu", "4"), ("mem", "1Gi")], &[("cpu", "500m")]);
        assert!(!apply_zero_defaults(&mut pool.spec));

        pool.spec.config.defaults_assign_zero = true;
        assert!(apply_zero_defaults(&mut pool.spec));
        assert_eq!(pool.spec.defaults, list(&[("cpu", "500m"), ("mem", "0")]));
        assert!(!apply_zero_defaults(&mut pool.spec));
        assert_eq!(effective_hard(&pool, "ns"), list(&[("cpu", "500m"), ("mem", "0")]));
    }

    #[derive(Default)]
    struct RecordingWriter {
        written: Mutex<BTreeMap<String, ResourceList>>,
    }

    #[async_trait]
    impl QuotaWriter for RecordingWriter {
        async fn upsert(&self, _pool: &ResourcePool, namespace: &str, hard: ResourceList) -> anyhow::Result<()> {
            self.written.lock().await.insert(namespace.to_string(), hard);
            Ok(())
        }

        async fn delete(&self, _pool: &ResourcePool, namespace: &str) -> anyhow::Result<()> {
            self.written.lock().await.remove(namespace);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_project_and_retract() {
        let mut pool = make_pool(&[("cpu", "4")], &[]);
        pool.status.claims.upsert("a", make_item("u1", &[("cpu", "1")]));
        let writer = RecordingWriter::default();

        project(&writer, &pool, &["a".to_string(), "b".to_string()]).await.unwrap();
        {
            let written = writer.written.lock().await;
            assert_eq!(written["a"], list(&[("cpu", "1")]));
            assert!(written["b"].is_empty());
        }

        retract(&writer, &pool, &["b".to_string()]).await.unwrap();
        assert!(!writer.written.lock().await.contains_key("b"));
    }
}

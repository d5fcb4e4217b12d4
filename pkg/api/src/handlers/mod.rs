pub mod claims;
pub mod kinds;
pub mod metrics;
pub mod namespaces;
pub mod pools;
pub mod quotas;
pub mod watch;

use pkg_state::typed::{self, Versioned};
use pkg_state::{ObjectStore, StoreError};
use pkg_types::ResourceKind;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::ApiError;

/// Read one object or answer 404.
pub(crate) async fn load<T: DeserializeOwned>(
    store: &dyn ObjectStore,
    kind: ResourceKind,
    namespace: &str,
    name: &str,
) -> Result<Versioned<T>, ApiError> {
    typed::read::<T>(store, &kind.key(namespace, name))
        .await?
        .ok_or_else(|| ApiError::not_found(&kind.to_string(), name))
}

/// Create-only write; an existing key answers 409.
pub(crate) async fn create<T: Serialize>(
    store: &dyn ObjectStore,
    kind: ResourceKind,
    namespace: &str,
    name: &str,
    object: &T,
) -> Result<u64, ApiError> {
    match typed::write(store, &kind.key(namespace, name), object, None).await {
        Ok(version) => Ok(version),
        Err(StoreError::Conflict { .. }) => {
            Err(ApiError::Conflict(format!("{} {} already exists", kind, name)))
        }
        Err(e) => Err(e.into()),
    }
}

pub(crate) async fn list_objects<T: DeserializeOwned>(
    store: &dyn ObjectStore,
    kind: ResourceKind,
    namespace: Option<&str>,
) -> Result<Vec<T>, ApiError> {
    Ok(typed::list::<T>(store, &kind.prefix(namespace))
        .await?
        .into_iter()
        .map(|v| v.object)
        .collect())
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use pkg_metrics::MetricsRegistry;
    use pkg_state::MemoryStore;
    use pkg_types::Registry;

    use crate::AppState;

    pub fn make_state() -> AppState {
        AppState {
            store: Arc::new(MemoryStore::new()),
            registry: Arc::new(Registry::with_defaults()),
            metrics: Arc::new(MetricsRegistry::new()),
            join_token: "secret".to_string(),
        }
    }
}

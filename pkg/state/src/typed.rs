//! JSON (de)serialization on top of [`ObjectStore`].

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::store::{ObjectStore, Record, StoreError};

/// A decoded object together with the version it was read at.
#[derive(Debug, Clone)]
pub struct Versioned<T> {
    pub version: u64,
    pub object: T,
}

pub fn decode<T: DeserializeOwned>(key: &str, record: &Record) -> Result<Versioned<T>, StoreError> {
    let object = serde_json::from_slice(&record.data).map_err(|source| StoreError::Decode {
        key: key.to_string(),
        source,
    })?;
    Ok(Versioned {
        version: record.version,
        object,
    })
}

fn encode<T: Serialize>(key: &str, object: &T) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(object).map_err(|source| StoreError::Encode {
        key: key.to_string(),
        source,
    })
}

pub async fn read<T: DeserializeOwned>(
    store: &dyn ObjectStore,
    key: &str,
) -> Result<Option<Versioned<T>>, StoreError> {
    match store.get(key).await? {
        Some(record) => decode(key, &record).map(Some),
        None => Ok(None),
    }
}

/// Compare-and-swap an object. `expected = None` creates it.
pub async fn write<T: Serialize>(
    store: &dyn ObjectStore,
    key: &str,
    object: &T,
    expected: Option<u64>,
) -> Result<u64, StoreError> {
    let data = encode(key, object)?;
    store.compare_and_swap(key, data, expected).await
}

/// Unconditional write.
pub async fn put<T: Serialize>(
    store: &dyn ObjectStore,
    key: &str,
    object: &T,
) -> Result<u64, StoreError> {
    let data = encode(key, object)?;
    store.put(key, data).await
}

/// Decode every object under `prefix`. Records that fail to decode are
/// logged and skipped so one bad object cannot stall a whole listing.
pub async fn list<T: DeserializeOwned>(
    store: &dyn ObjectStore,
    prefix: &str,
) -> Result<Vec<Versioned<T>>, StoreError> {
    let entries = store.list_prefix(prefix).await?;
    Ok(entries
        .into_iter()
        .filter_map(|(key, record)| match decode(&key, &record) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("Skipping {}", e);
                None
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Item {
        name: String,
    }

    #[tokio::test]
    async fn test_read_write_roundtrip_and_conflict() {
        let store = MemoryStore::new();
        let item = Item { name: "a".into() };
        let v = write(&store, "/registry/items/a", &item, None).await.unwrap();

        let got: Versioned<Item> = read(&store, "/registry/items/a").await.unwrap().unwrap();
        assert_eq!(got.version, v);
        assert_eq!(got.object, item);

        assert!(
            write(&store, "/registry/items/a", &item, Some(v + 1))
                .await
                .unwrap_err()
                .is_conflict()
        );
    }

    #[tokio::test]
    async fn test_list_skips_malformed() {
        let store = MemoryStore::new();
        put(&store, "/registry/items/a", &Item { name: "a".into() }).await.unwrap();
        store.put("/registry/items/b", b"not json".to_vec()).await.unwrap();

        let items: Vec<Versioned<Item>> = list(&store, "/registry/items/").await.unwrap();
        assert_eq!(items.len(), 1);

        let err = read::<Item>(&store, "/registry/items/b").await.unwrap_err();
        assert!(matches!(err, StoreError::Decode { .. }));
    }
}

use async_trait::async_trait;
use pkg_constants::state::EVENT_LOG_CAPACITY;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::store::{ObjectStore, Record, StoreError, check_version};
use crate::watch::{EventLog, EventType};

/// In-process store for tests and `--in-memory` servers.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
    pub event_log: EventLog,
}

#[derive(Default)]
struct MemoryInner {
    revision: u64,
    records: BTreeMap<String, Record>,
}

impl MemoryInner {
    fn next_version(&mut self) -> u64 {
        self.revision += 1;
        self.revision
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryInner::default())),
            event_log: EventLog::new(EVENT_LOG_CAPACITY),
        }
    }

    async fn store(&self, key: &str, data: Vec<u8>, expected: Option<Option<u64>>) -> Result<u64, StoreError> {
        let version = {
            let mut inner = self.inner.lock().await;
            if let Some(expected) = expected {
                let current = inner.records.get(key).map(|r| r.version);
                check_version(key, current, expected)?;
            }
            let version = inner.next_version();
            inner.records.insert(
                key.to_string(),
                Record {
                    version,
                    data: data.clone(),
                },
            );
            version
        };
        self.event_log
            .emit(EventType::Put, key.to_string(), version, Some(data))
            .await;
        Ok(version)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Record>, StoreError> {
        Ok(self.inner.lock().await.records.get(key).cloned())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        data: Vec<u8>,
        expected: Option<u64>,
    ) -> Result<u64, StoreError> {
        self.store(key, data, Some(expected)).await
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> Result<u64, StoreError> {
        self.store(key, data, None).await
    }

    async fn delete(&self, key: &str, expected: Option<u64>) -> Result<bool, StoreError> {
        let version = {
            let mut inner = self.inner.lock().await;
            let Some(current) = inner.records.get(key).map(|r| r.version) else {
                return Ok(false);
            };
            if expected.is_some() {
                check_version(key, Some(current), expected)?;
            }
            inner.records.remove(key);
            inner.next_version()
        };
        self.event_log
            .emit(EventType::Delete, key.to_string(), version, None)
            .await;
        Ok(true)
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<(String, Record)>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .records
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, r)| (k.clone(), r.clone()))
            .collect())
    }

    fn event_log(&self) -> &EventLog {
        &self.event_log
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_versions_never_repeat_after_delete() {
        let store = MemoryStore::new();
        let v1 = store.compare_and_swap("k", b"a".to_vec(), None).await.unwrap();
        assert!(store.delete("k", Some(v1)).await.unwrap());
        let v2 = store.compare_and_swap("k", b"b".to_vec(), None).await.unwrap();
        assert!(v2 > v1);
        assert!(
            store
                .compare_and_swap("k", b"c".to_vec(), Some(v1))
                .await
                .unwrap_err()
                .is_conflict()
        );
    }

    #[tokio::test]
    async fn test_list_prefix_is_bounded() {
        let store = MemoryStore::new();
        store.put("/registry/resourcepools/a", b"1".to_vec()).await.unwrap();
        store.put("/registry/resourcepools/b", b"2".to_vec()).await.unwrap();
        store.put("/registry/resourcequotas/x/q", b"3".to_vec()).await.unwrap();

        let pools = store.list_prefix("/registry/resourcepools/").await.unwrap();
        let keys: Vec<_> = pools.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["/registry/resourcepools/a", "/registry/resourcepools/b"]);
    }

    #[tokio::test]
    async fn test_writes_emit_events() {
        let store = MemoryStore::new();
        let mut rx = store.event_log.subscribe();
        let v = store.put("/registry/namespaces/a", b"{}".to_vec()).await.unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.key, "/registry/namespaces/a");
        assert_eq!(event.version, v);
    }
}

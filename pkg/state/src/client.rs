use async_trait::async_trait;
use pkg_constants::state::EVENT_LOG_CAPACITY;
use slatedb::Db;
use slatedb::object_store::local::LocalFileSystem;
use slatedb::object_store::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::store::{ObjectStore, Record, StoreError, check_version};
use crate::watch::{EventLog, EventType};

const VERSION_PREFIX_LEN: usize = 8;

/// Persistent state store backed by SlateDB on a local filesystem.
///
/// Values are stored as an 8-byte big-endian version followed by the
/// payload. Writes are serialized through one lock so read-compare-write is
/// atomic within the process.
#[derive(Clone)]
pub struct StateStore {
    db: Db,
    revision: Arc<AtomicU64>,
    write_lock: Arc<Mutex<()>>,
    pub event_log: EventLog,
}

impl StateStore {
    /// Open (or create) a state store rooted at `path` on the local filesystem.
    pub async fn new(path: &str) -> anyhow::Result<Self> {
        info!("Opening SlateDB state store at {}", path);

        std::fs::create_dir_all(path)
            .map_err(|e| anyhow::anyhow!("Failed to create data directory {}: {}", path, e))?;

        let object_store = Arc::new(
            LocalFileSystem::new_with_prefix(path)
                .map_err(|e| anyhow::anyhow!("Failed to create local object store: {}", e))?,
        );
        let db = Db::open(Path::from("/"), object_store)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to open SlateDB: {}", e))?;

        let store = Self {
            db,
            revision: Arc::new(AtomicU64::new(0)),
            write_lock: Arc::new(Mutex::new(())),
            event_log: EventLog::new(EVENT_LOG_CAPACITY),
        };

        // Resume the version counter past everything already on disk.
        let latest = store
            .scan("")
            .await?
            .iter()
            .map(|(_, r)| r.version)
            .max()
            .unwrap_or(0);
        store.revision.store(latest, Ordering::SeqCst);
        info!("State store opened at revision {}", latest);
        Ok(store)
    }

    async fn read(&self, key: &str) -> Result<Option<Record>, StoreError> {
        match self.db.get(key.as_bytes()).await {
            Ok(Some(bytes)) => decode_record(key, &bytes).map(Some),
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::Backend(format!("SlateDB get failed: {}", e))),
        }
    }

    async fn write(&self, key: &str, data: Vec<u8>) -> Result<u64, StoreError> {
        let version = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
        let mut value = Vec::with_capacity(VERSION_PREFIX_LEN + data.len());
        value.extend_from_slice(&version.to_be_bytes());
        value.extend_from_slice(&data);
        self.db
            .put(key.as_bytes(), &value)
            .await
            .map_err(|e| StoreError::Backend(format!("SlateDB put failed: {}", e)))?;
        debug!(key, version, "stored record");
        self.event_log
            .emit(EventType::Put, key.to_string(), version, Some(data))
            .await;
        Ok(version)
    }

    async fn scan(&self, prefix: &str) -> Result<Vec<(String, Record)>, StoreError> {
        let mut results = Vec::new();
        let mut iter = self
            .db
            .scan_prefix(prefix.as_bytes())
            .await
            .map_err(|e| StoreError::Backend(format!("SlateDB scan_prefix failed: {}", e)))?;

        while let Ok(Some(kv)) = iter.next().await {
            let key = String::from_utf8_lossy(&kv.key).to_string();
            let record = decode_record(&key, &kv.value)?;
            results.push((key, record));
        }
        Ok(results)
    }

    /// Gracefully close the state store.
    pub async fn close(self) -> anyhow::Result<()> {
        info!("Closing SlateDB state store");
        self.db
            .close()
            .await
            .map_err(|e| anyhow::anyhow!("SlateDB close failed: {}", e))
    }
}

fn decode_record(key: &str, bytes: &[u8]) -> Result<Record, StoreError> {
    if bytes.len() < VERSION_PREFIX_LEN {
        return Err(StoreError::Backend(format!(
            "record at {} is shorter than its version header",
            key
        )));
    }
    let (header, data) = bytes.split_at(VERSION_PREFIX_LEN);
    let mut raw = [0u8; VERSION_PREFIX_LEN];
    raw.copy_from_slice(header);
    Ok(Record {
        version: u64::from_be_bytes(raw),
        data: data.to_vec(),
    })
}

#[async_trait]
impl ObjectStore for StateStore {
    async fn get(&self, key: &str) -> Result<Option<Record>, StoreError> {
        self.read(key).await
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        data: Vec<u8>,
        expected: Option<u64>,
    ) -> Result<u64, StoreError> {
        let _guard = self.write_lock.lock().await;
        let current = self.read(key).await?.map(|r| r.version);
        check_version(key, current, expected)?;
        self.write(key, data).await
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> Result<u64, StoreError> {
        let _guard = self.write_lock.lock().await;
        self.write(key, data).await
    }

    async fn delete(&self, key: &str, expected: Option<u64>) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().await;
        let Some(current) = self.read(key).await? else {
            return Ok(false);
        };
        if expected.is_some() {
            check_version(key, Some(current.version), expected)?;
        }
        self.db
            .delete(key.as_bytes())
            .await
            .map_err(|e| StoreError::Backend(format!("SlateDB delete failed: {}", e)))?;
        let version = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
        self.event_log
            .emit(EventType::Delete, key.to_string(), version, None)
            .await;
        Ok(true)
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<(String, Record)>, StoreError> {
        self.scan(prefix).await
    }

    fn event_log(&self) -> &EventLog {
        &self.event_log
    }
}

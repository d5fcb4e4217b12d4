use async_trait::async_trait;
use thiserror::Error;

use crate::watch::EventLog;

/// Raw stored bytes plus the version they were written at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub version: u64,
    pub data: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("version conflict on {key}: expected {expected:?}, found {found:?}")]
    Conflict {
        key: String,
        expected: Option<u64>,
        found: Option<u64>,
    },
    #[error("malformed record at {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode object for {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Versioned key-value store with compare-and-swap.
///
/// Every successful write is stamped with a version taken from a
/// store-wide counter that only moves forward, so a version seen on a
/// deleted-and-recreated key never matches again.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Record>, StoreError>;

    /// Write `data` if the current version equals `expected`. `None` means
    /// the key must not exist. Returns the new version.
    async fn compare_and_swap(
        &self,
        key: &str,
        data: Vec<u8>,
        expected: Option<u64>,
    ) -> Result<u64, StoreError>;

    /// Unconditional write. Returns the new version.
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<u64, StoreError>;

    /// Delete a key. With `expected` set the delete only happens at that
    /// version. Returns whether a record was removed.
    async fn delete(&self, key: &str, expected: Option<u64>) -> Result<bool, StoreError>;

    /// Every record whose key starts with `prefix`, ordered by key.
    async fn list_prefix(&self, prefix: &str) -> Result<Vec<(String, Record)>, StoreError>;

    fn event_log(&self) -> &EventLog;
}

/// Reject a write unless the observed version matches the expectation.
pub(crate) fn check_version(
    key: &str,
    current: Option<u64>,
    expected: Option<u64>,
) -> Result<(), StoreError> {
    if current == expected {
        Ok(())
    } else {
        Err(StoreError::Conflict {
            key: key.to_string(),
            expected,
            found: current,
        })
    }
}

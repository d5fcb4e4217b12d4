use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::resources::ResourceList;

/// One granted claim as recorded in a pool's ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimItem {
    pub uid: String,
    pub name: String,
    #[serde(default)]
    pub claims: ResourceList,
}

/// Per-namespace, per-claim record of granted amounts.
///
/// The pool status owns the only copy. Mutation happens on an owned
/// snapshot taken from a read of the pool; the snapshot is then written back
/// with compare-and-swap, so no two writers ever share a ledger in memory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimLedger(BTreeMap<String, Vec<ClaimItem>>);

impl ClaimLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a claim by namespace and UID.
    pub fn get(&self, namespace: &str, uid: &str) -> Option<&ClaimItem> {
        self.0.get(namespace)?.iter().find(|item| item.uid == uid)
    }

    /// Locate a claim by UID in any namespace.
    pub fn find(&self, uid: &str) -> Option<(&str, &ClaimItem)> {
        self.iter().find(|(_, item)| item.uid == uid)
    }

    /// Replace the entry with the same UID in place, or append a new one.
    /// Entries with other UIDs are never touched.
    pub fn upsert(&mut self, namespace: &str, item: ClaimItem) {
        let bucket = self.0.entry(namespace.to_string()).or_default();
        match bucket.iter_mut().find(|existing| existing.uid == item.uid) {
            Some(existing) => *existing = item,
            None => bucket.push(item),
        }
    }

    /// Remove a claim; the namespace key goes away with its last claim.
    pub fn remove(&mut self, namespace: &str, uid: &str) -> Option<ClaimItem> {
        let bucket = self.0.get_mut(namespace)?;
        let removed = bucket
            .iter()
            .position(|item| item.uid == uid)
            .map(|idx| bucket.remove(idx));
        if bucket.is_empty() {
            self.0.remove(namespace);
        }
        removed
    }

    /// Drop a whole namespace bucket, returning what it held.
    pub fn remove_namespace(&mut self, namespace: &str) -> Vec<ClaimItem> {
        self.0.remove(namespace).unwrap_or_default()
    }

    /// Total number of claims across all namespaces.
    pub fn count_claims(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains_namespace(&self, namespace: &str) -> bool {
        self.0.contains_key(namespace)
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Claims of one namespace in insertion order.
    pub fn bucket(&self, namespace: &str) -> &[ClaimItem] {
        self.0.get(namespace).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every `(namespace, claim)` pair.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ClaimItem)> {
        self.0
            .iter()
            .flat_map(|(ns, items)| items.iter().map(move |item| (ns.as_str(), item)))
    }
}

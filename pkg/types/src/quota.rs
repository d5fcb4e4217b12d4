use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::pool::PoolReference;
use crate::resources::ResourceList;

/// Native per-namespace quota object. Pools project each member
/// namespace's claimed amounts plus defaults into one of these; enforcement
/// against workloads happens elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceQuota {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub hard: ResourceList,
    /// Pool that owns this quota, if it is a projection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<PoolReference>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

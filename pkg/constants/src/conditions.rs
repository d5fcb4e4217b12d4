//! Condition types and reasons shared by claims and pools.

pub const READY_CONDITION: &str = "Ready";
pub const ASSIGNED_CONDITION: &str = "Assigned";
pub const BOUND_CONDITION: &str = "Bound";
pub const EXHAUSTED_CONDITION: &str = "Exhausted";

pub const SUCCEEDED_REASON: &str = "Succeeded";
pub const FAILED_REASON: &str = "Failed";
pub const POOL_EXHAUSTED_REASON: &str = "PoolExhausted";
pub const QUEUE_EXHAUSTED_REASON: &str = "QueueExhausted";
pub const RELEASED_REASON: &str = "Released";
pub const DISASSOCIATED_REASON: &str = "Disassociated";

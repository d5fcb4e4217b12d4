pub mod claim;
pub mod condition;
pub mod config;
pub mod ledger;
pub mod namespace;
pub mod pool;
pub mod quantity;
pub mod quota;
pub mod registry;
pub mod resources;
pub mod selector;
pub mod validate;

pub use claim::{ResourcePoolClaim, ResourcePoolClaimSpec, ResourcePoolClaimStatus};
pub use condition::{Condition, ConditionList, ConditionStatus};
pub use ledger::{ClaimItem, ClaimLedger};
pub use namespace::{Namespace, NamespacePhase};
pub use pool::{
    PoolAllocation, PoolExhaustion, PoolQuota, PoolReference, ResourcePool, ResourcePoolConfig,
    ResourcePoolSpec, ResourcePoolStatus,
};
pub use quantity::{Quantity, QuantityError};
pub use quota::ResourceQuota;
pub use registry::{Registry, ResourceKind};
pub use resources::ResourceList;
pub use selector::NamespaceSelector;

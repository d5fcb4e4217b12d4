pub mod backend;
pub mod claim;
pub mod pool;

#[cfg(test)]
mod fixtures;

pub use backend::{StoreNamespaceResolver, StoreQuotaWriter};
pub use claim::ClaimController;
pub use pool::PoolController;

//! Resource pool allocation engine: ledger accounting, admission, quota
//! projection and optimistic-concurrency pool mutation.

pub mod allocator;
pub mod error;
pub mod mutator;
pub mod planner;
pub mod projector;
pub mod retry;
pub mod status;

pub use allocator::{AdmissionPolicy, ExhaustionMap};
pub use error::{MutationError, ResourceViolation, ViolationKind};
pub use mutator::PoolMutator;
pub use planner::{ClaimDecision, Eviction, PoolPlan, plan_pass};
pub use projector::{NamespaceResolver, QuotaWriter};
pub use retry::{Cancellation, IsConflict, RetryError, RetryPolicy, retry_on_conflict};

use pkg_constants::conditions::{POOL_EXHAUSTED_REASON, QUEUE_EXHAUSTED_REASON};
use pkg_state::StoreError;
use pkg_types::Quantity;
use std::fmt;
use thiserror::Error;

use crate::retry::RetryError;

/// Why one requested resource could not be granted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViolationKind {
    /// The pool does not declare the resource.
    Missing,
    /// Not enough headroom; `available` is what the check saw.
    Exhausted { available: Quantity },
    /// An older claim is already waiting for this resource.
    Queued { queued: Quantity },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceViolation {
    pub resource: String,
    pub requested: Quantity,
    pub kind: ViolationKind,
}

impl ResourceViolation {
    pub fn is_queued(&self) -> bool {
        matches!(self.kind, ViolationKind::Queued { .. })
    }

    /// Headroom observed for the resource; zero when the pool lacks it.
    pub fn available(&self) -> Quantity {
        match self.kind {
            ViolationKind::Exhausted { available } => available,
            _ => Quantity::zero(),
        }
    }
}

impl fmt::Display for ResourceViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = &self.resource;
        match &self.kind {
            ViolationKind::Missing => {
                write!(f, "requested: {}={}, available: {}=0", r, self.requested, r)
            }
            ViolationKind::Exhausted { available } => {
                write!(f, "requested: {}={}, available: {}={}", r, self.requested, r, available)
            }
            ViolationKind::Queued { queued } => {
                write!(f, "requested: {}={}, queued: {}={}", r, self.requested, r, queued)
            }
        }
    }
}

/// Condition reason for a rejected claim.
pub fn violation_reason(violations: &[ResourceViolation]) -> &'static str {
    if violations.iter().any(ResourceViolation::is_queued) {
        QUEUE_EXHAUSTED_REASON
    } else {
        POOL_EXHAUSTED_REASON
    }
}

/// All violations in one line, `"; "`-separated.
pub fn violation_message(violations: &[ResourceViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error)]
pub enum MutationError {
    #[error("claim {claim} does not fit pool {pool}: {}", violation_message(.violations))]
    Rejected {
        pool: String,
        claim: String,
        violations: Vec<ResourceViolation>,
    },
    #[error("{target} still conflicted after {attempts} attempts")]
    ConflictRetriesExhausted { target: String, attempts: u32 },
    #[error("pool mutation cancelled")]
    Cancelled,
    #[error("resource pool {0} not found")]
    PoolNotFound(String),
    #[error("resource pool {0} is being deleted")]
    PoolDeleting(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl MutationError {
    /// Collapse a retry outcome for `target` into a mutation error.
    pub fn from_retry(target: &str, err: RetryError<MutationError>) -> Self {
        match err {
            RetryError::Exhausted { attempts, .. } => MutationError::ConflictRetriesExhausted {
                target: target.to_string(),
                attempts,
            },
            RetryError::Cancelled => MutationError::Cancelled,
            RetryError::Failed(e) => e,
        }
    }

    /// Worth re-invoking later without any change to the inputs.
    pub fn is_transient(&self) -> bool {
        match self {
            MutationError::ConflictRetriesExhausted { .. } => true,
            MutationError::Store(e) => matches!(e, StoreError::Backend(_) | StoreError::Conflict { .. }),
            _ => false,
        }
    }

    /// A stored object could not be decoded.
    pub fn is_malformed(&self) -> bool {
        matches!(self, MutationError::Store(StoreError::Decode { .. }))
    }
}

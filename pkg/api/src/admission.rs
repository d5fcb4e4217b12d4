//! Write-time checks on pools and claims, applied by the handlers before
//! anything reaches the store.

use pkg_allocation::projector::apply_zero_defaults;
use pkg_constants::pool::RELEASE_ANNOTATION;
use pkg_types::claim::{ResourcePoolClaim, ResourcePoolClaimSpec};
use pkg_types::pool::{ResourcePool, ResourcePoolSpec};
use pkg_types::Quantity;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AdmissionError {
    #[error("{resource} is claimed ({claimed}) and cannot be removed from the pool's hard limits")]
    ClaimedResourceRemoved { resource: String, claimed: Quantity },
    #[error("hard limit for {resource} ({hard}) cannot be lower than what is claimed ({claimed})")]
    BelowClaimed {
        resource: String,
        hard: Quantity,
        claimed: Quantity,
    },
    #[error("{field} of a bound claim cannot be changed; release the claim first")]
    ImmutableWhileBound { field: &'static str },
    #[error(
        "claim {}/{} is bound; set the {} annotation to \"true\" before deleting it",
        .namespace,
        .name,
        RELEASE_ANNOTATION
    )]
    DeleteWhileBound { namespace: String, name: String },
}

/// Defaults the pool spec on every write.
pub fn mutate_pool(spec: &mut ResourcePoolSpec) -> bool {
    apply_zero_defaults(spec)
}

/// Hard limits may only shrink down to what is already claimed.
pub fn validate_pool_update(current: &ResourcePool, next: &ResourcePoolSpec) -> Result<(), AdmissionError> {
    for (resource, claimed) in &current.status.allocation.claimed {
        if claimed.is_zero() || claimed.is_negative() {
            continue;
        }
        match next.quota.hard.get(resource) {
            None => {
                return Err(AdmissionError::ClaimedResourceRemoved {
                    resource: resource.clone(),
                    claimed: *claimed,
                });
            }
            Some(hard) if hard < claimed => {
                return Err(AdmissionError::BelowClaimed {
                    resource: resource.clone(),
                    hard: *hard,
                    claimed: *claimed,
                });
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// While bound, the pool a claim draws from and the amounts it holds are
/// fixed.
pub fn validate_claim_update(current: &ResourcePoolClaim, next: &ResourcePoolClaimSpec) -> Result<(), AdmissionError> {
    if !current.is_bound() {
        return Ok(());
    }
    if current.spec.pool != next.pool {
        return Err(AdmissionError::ImmutableWhileBound { field: "pool" });
    }
    if current.spec.resource_claims != next.resource_claims {
        return Err(AdmissionError::ImmutableWhileBound { field: "claim" });
    }
    Ok(())
}

pub fn validate_claim_delete(current: &ResourcePoolClaim) -> Result<(), AdmissionError> {
    if current.is_bound() {
        return Err(AdmissionError::DeleteWhileBound {
            namespace: current.namespace.clone(),
            name: current.name.clone(),
        });
    }
    Ok(())
}

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::Utc;
use pkg_state::typed;
use pkg_types::claim::{ResourcePoolClaim, ResourcePoolClaimStatus};
use pkg_types::validate::{validate_name, validate_resource_list};
use pkg_types::{Namespace, ResourceKind};
use tracing::info;
use uuid::Uuid;

use super::{create, list_objects, load};
use crate::AppState;
use crate::admission::{validate_claim_delete, validate_claim_update};
use crate::error::ApiError;

fn validate_claim(claim: &ResourcePoolClaim) -> Result<(), ApiError> {
    validate_name(&claim.spec.pool).map_err(ApiError::invalid)?;
    validate_resource_list("claim", &claim.spec.resource_claims).map_err(ApiError::invalid)
}

pub async fn create_claim(
    State(state): State<AppState>,
    Path(ns): Path<String>,
    Json(body): Json<ResourcePoolClaim>,
) -> Result<(StatusCode, Json<ResourcePoolClaim>), ApiError> {
    validate_name(&body.name).map_err(ApiError::invalid)?;
    validate_claim(&body)?;
    load::<Namespace>(state.store.as_ref(), ResourceKind::Namespace, "", &ns).await?;

    let claim = ResourcePoolClaim {
        uid: Uuid::new_v4().to_string(),
        namespace: ns.clone(),
        generation: 1,
        created_at: Utc::now(),
        status: ResourcePoolClaimStatus::default(),
        ..body
    };
    create(
        state.store.as_ref(),
        ResourceKind::ResourcePoolClaim,
        &ns,
        &claim.name,
        &claim,
    )
    .await?;
    info!("Created resource pool claim {}/{} (pool={})", ns, claim.name, claim.spec.pool);
    Ok((StatusCode::CREATED, Json(claim)))
}

pub async fn list_all_claims(
    State(state): State<AppState>,
) -> Result<Json<Vec<ResourcePoolClaim>>, ApiError> {
    Ok(Json(
        list_objects(state.store.as_ref(), ResourceKind::ResourcePoolClaim, None).await?,
    ))
}

pub async fn list_claims(
    State(state): State<AppState>,
    Path(ns): Path<String>,
) -> Result<Json<Vec<ResourcePoolClaim>>, ApiError> {
    Ok(Json(
        list_objects(state.store.as_ref(), ResourceKind::ResourcePoolClaim, Some(&ns)).await?,
    ))
}

pub async fn get_claim(
    State(state): State<AppState>,
    Path((ns, name)): Path<(String, String)>,
) -> Result<Json<ResourcePoolClaim>, ApiError> {
    let claim =
        load::<ResourcePoolClaim>(state.store.as_ref(), ResourceKind::ResourcePoolClaim, &ns, &name).await?;
    Ok(Json(claim.object))
}

/// Replace spec, labels and annotations. Releasing a claim is an update
/// that sets the release annotation.
pub async fn update_claim(
    State(state): State<AppState>,
    Path((ns, name)): Path<(String, String)>,
    Json(body): Json<ResourcePoolClaim>,
) -> Result<Json<ResourcePoolClaim>, ApiError> {
    validate_claim(&body)?;
    let current =
        load::<ResourcePoolClaim>(state.store.as_ref(), ResourceKind::ResourcePoolClaim, &ns, &name).await?;
    validate_claim_update(&current.object, &body.spec)?;

    let mut claim = current.object;
    if claim.spec != body.spec {
        claim.generation += 1;
        claim.spec = body.spec;
    }
    claim.labels = body.labels;
    claim.annotations = body.annotations;
    typed::write(
        state.store.as_ref(),
        &ResourceKind::ResourcePoolClaim.key(&ns, &name),
        &claim,
        Some(current.version),
    )
    .await?;
    info!("Updated resource pool claim {}/{}", ns, name);
    Ok(Json(claim))
}

pub async fn delete_claim(
    State(state): State<AppState>,
    Path((ns, name)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let current =
        load::<ResourcePoolClaim>(state.store.as_ref(), ResourceKind::ResourcePoolClaim, &ns, &name).await?;
    validate_claim_delete(&current.object)?;
    state
        .store
        .delete(&ResourceKind::ResourcePoolClaim.key(&ns, &name), Some(current.version))
        .await?;
    info!("Deleted resource pool claim {}/{}", ns, name);
    Ok(StatusCode::NO_CONTENT)
}

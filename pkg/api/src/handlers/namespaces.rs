use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::Utc;
use pkg_state::typed;
use pkg_types::validate::validate_name;
use pkg_types::{Namespace, NamespacePhase, ResourceKind};
use tracing::info;

use super::{create, list_objects, load};
use crate::AppState;
use crate::error::ApiError;

pub async fn create_namespace(
    State(state): State<AppState>,
    Json(mut ns): Json<Namespace>,
) -> Result<(StatusCode, Json<Namespace>), ApiError> {
    validate_name(&ns.name).map_err(ApiError::invalid)?;
    ns.created_at = Utc::now();
    ns.phase = NamespacePhase::Active;
    ns.deletion_timestamp = None;
    create(state.store.as_ref(), ResourceKind::Namespace, "", &ns.name, &ns).await?;
    info!("Created namespace: {}", ns.name);
    Ok((StatusCode::CREATED, Json(ns)))
}

pub async fn list_namespaces(State(state): State<AppState>) -> Result<Json<Vec<Namespace>>, ApiError> {
    Ok(Json(
        list_objects(state.store.as_ref(), ResourceKind::Namespace, None).await?,
    ))
}

pub async fn get_namespace(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Namespace>, ApiError> {
    let ns = load::<Namespace>(state.store.as_ref(), ResourceKind::Namespace, "", &name).await?;
    Ok(Json(ns.object))
}

/// Labels are the only mutable part of a namespace; they decide pool
/// membership.
pub async fn update_namespace(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<Namespace>,
) -> Result<Json<Namespace>, ApiError> {
    let current = load::<Namespace>(state.store.as_ref(), ResourceKind::Namespace, "", &name).await?;
    let mut ns = current.object;
    ns.labels = body.labels;
    typed::write(
        state.store.as_ref(),
        &ResourceKind::Namespace.key("", &name),
        &ns,
        Some(current.version),
    )
    .await?;
    info!("Updated namespace: {}", name);
    Ok(Json(ns))
}

/// Delete a namespace together with the claims and quotas inside it.
pub async fn delete_namespace(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    let store = state.store.as_ref();
    if !store.delete(&ResourceKind::Namespace.key("", &name), None).await? {
        return Err(ApiError::not_found("Namespace", &name));
    }
    for kind in [ResourceKind::ResourcePoolClaim, ResourceKind::ResourceQuota] {
        for (key, _) in store.list_prefix(&kind.prefix(Some(&name))).await? {
            store.delete(&key, None).await?;
        }
    }
    info!("Deleted namespace: {}", name);
    Ok(StatusCode::NO_CONTENT)
}

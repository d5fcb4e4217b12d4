use axum::{
    Json,
    extract::{Path, State},
};
use pkg_types::{ResourceKind, ResourceQuota};

use super::{list_objects, load};
use crate::AppState;
use crate::error::ApiError;

// Quotas are written by the pool controller only, so they are read-only here.

pub async fn list_all_quotas(State(state): State<AppState>) -> Result<Json<Vec<ResourceQuota>>, ApiError> {
    Ok(Json(
        list_objects(state.store.as_ref(), ResourceKind::ResourceQuota, None).await?,
    ))
}

pub async fn list_quotas(
    State(state): State<AppState>,
    Path(ns): Path<String>,
) -> Result<Json<Vec<ResourceQuota>>, ApiError> {
    Ok(Json(
        list_objects(state.store.as_ref(), ResourceKind::ResourceQuota, Some(&ns)).await?,
    ))
}

pub async fn get_quota(
    State(state): State<AppState>,
    Path((ns, name)): Path<(String, String)>,
) -> Result<Json<ResourceQuota>, ApiError> {
    let quota = load::<ResourceQuota>(state.store.as_ref(), ResourceKind::ResourceQuota, &ns, &name).await?;
    Ok(Json(quota.object))
}

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use pkg_state::typed;
use pkg_types::pool::{ResourcePool, ResourcePoolSpec, ResourcePoolStatus};
use pkg_types::validate::{validate_name, validate_resource_list};
use pkg_types::ResourceKind;
use tracing::info;
use uuid::Uuid;

use super::{create, list_objects, load};
use crate::AppState;
use crate::admission::{mutate_pool, validate_pool_update};
use crate::error::ApiError;

fn validate_spec(spec: &ResourcePoolSpec) -> Result<(), ApiError> {
    validate_resource_list("quota.hard", &spec.quota.hard).map_err(ApiError::invalid)?;
    validate_resource_list("defaults", &spec.defaults).map_err(ApiError::invalid)?;
    Ok(())
}

pub async fn create_pool(
    State(state): State<AppState>,
    Json(body): Json<ResourcePool>,
) -> Result<(StatusCode, Json<ResourcePool>), ApiError> {
    validate_name(&body.name).map_err(ApiError::invalid)?;
    let mut spec = body.spec;
    validate_spec(&spec)?;
    mutate_pool(&mut spec);

    let pool = ResourcePool {
        uid: Uuid::new_v4().to_string(),
        name: body.name,
        labels: body.labels,
        generation: 1,
        created_at: Utc::now(),
        deletion_timestamp: None,
        spec,
        status: ResourcePoolStatus::default(),
    };
    create(state.store.as_ref(), ResourceKind::ResourcePool, "", &pool.name, &pool).await?;
    info!("Created resource pool: {}", pool.name);
    Ok((StatusCode::CREATED, Json(pool)))
}

pub async fn list_pools(State(state): State<AppState>) -> Result<Json<Vec<ResourcePool>>, ApiError> {
    Ok(Json(
        list_objects(state.store.as_ref(), ResourceKind::ResourcePool, None).await?,
    ))
}

pub async fn get_pool(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ResourcePool>, ApiError> {
    let pool = load::<ResourcePool>(state.store.as_ref(), ResourceKind::ResourcePool, "", &name).await?;
    Ok(Json(pool.object))
}

/// Replace spec and labels. Status belongs to the pool controller and is
/// ignored in the body.
pub async fn update_pool(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<ResourcePool>,
) -> Result<Json<ResourcePool>, ApiError> {
    let current = load::<ResourcePool>(state.store.as_ref(), ResourceKind::ResourcePool, "", &name).await?;
    if current.object.is_deleting() {
        return Err(ApiError::Conflict(format!("ResourcePool {} is being deleted", name)));
    }
    let mut spec = body.spec;
    validate_spec(&spec)?;
    mutate_pool(&mut spec);
    validate_pool_update(&current.object, &spec)?;

    let mut pool = current.object;
    if pool.spec != spec {
        pool.generation += 1;
        pool.spec = spec;
    }
    pool.labels = body.labels;
    typed::write(
        state.store.as_ref(),
        &ResourceKind::ResourcePool.key("", &name),
        &pool,
        Some(current.version),
    )
    .await?;
    info!("Updated resource pool: {} (generation {})", name, pool.generation);
    Ok(Json(pool))
}

/// A pool nothing depends on goes away at once. Otherwise it is marked and
/// the pool controller drains it: claims are released and projected quotas
/// removed before the record is deleted.
pub async fn delete_pool(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let key = ResourceKind::ResourcePool.key("", &name);
    let current = load::<ResourcePool>(state.store.as_ref(), ResourceKind::ResourcePool, "", &name).await?;
    let mut pool = current.object;

    if pool.status.claims.is_empty() && pool.status.namespaces.is_empty() {
        state.store.delete(&key, Some(current.version)).await?;
        info!("Deleted resource pool: {}", name);
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    if pool.deletion_timestamp.is_none() {
        pool.deletion_timestamp = Some(Utc::now());
        typed::write(state.store.as_ref(), &key, &pool, Some(current.version)).await?;
        info!(
            "Marked resource pool {} for deletion ({} claims bound)",
            name, pool.status.claim_count
        );
    }
    Ok((StatusCode::ACCEPTED, Json(pool)).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing::make_state;
    use pkg_types::resources::parse_resource_list;
    use pkg_types::ResourceList;

    fn make_body(name: &str, hard: &[(&str, &str)]) -> ResourcePool {
        serde_json::from_value(serde_json::json!({
            "name": name,
            "spec": {
                "quota": {"hard": hard.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect::<std::collections::BTreeMap<_, _>>()},
                "config": {"defaultsZero": true}
            }
        }))
        .unwrap()
    }

    fn list(pairs: &[(&str, &str)]) -> ResourceList {
        parse_resource_list(pairs).unwrap()
    }

    #[tokio::test]
    async fn test_create_assigns_identity_and_defaults() {
        let state = make_state();
        let (status, Json(pool)) = create_pool(State(state.clone()), Json(make_body("shared", &[("requests.cpu", "2")])))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert!(!pool.uid.is_empty());
        assert!(pool.spec.defaults["requests.cpu"].is_zero());

        let err = create_pool(State(state), Json(make_body("shared", &[("requests.cpu", "2")])))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_create_rejects_bad_names_and_negatives() {
        let state = make_state();
        let err = create_pool(State(state.clone()), Json(make_body("Shared", &[("requests.cpu", "2")])))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err = create_pool(State(state), Json(make_body("shared", &[("requests.cpu", "-1")])))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_update_cannot_shrink_below_claimed() {
        let state = make_state();
        let (_, Json(mut pool)) = create_pool(State(state.clone()), Json(make_body("shared", &[("requests.cpu", "4")])))
            .await
            .unwrap();
        pool.status.allocation.claimed = list(&[("requests.cpu", "3")]);
        typed::put(state.store.as_ref(), &ResourceKind::ResourcePool.key("", "shared"), &pool)
            .await
            .unwrap();

        let err = update_pool(
            State(state.clone()),
            Path("shared".to_string()),
            Json(make_body("shared", &[("requests.cpu", "2")])),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let Json(updated) = update_pool(
            State(state),
            Path("shared".to_string()),
            Json(make_body("shared", &[("requests.cpu", "3")])),
        )
        .await
        .unwrap();
        assert_eq!(updated.generation, 2);
        // Status is kept from the store, not the body.
        assert_eq!(updated.status.allocation.claimed["requests.cpu"].to_string(), "3");
    }

    #[tokio::test]
    async fn test_delete_marks_pool_with_claims() {
        let state = make_state();
        create_pool(State(state.clone()), Json(make_body("empty", &[("pods", "1")])))
            .await
            .unwrap();
        let response = delete_pool(State(state.clone()), Path("empty".to_string())).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let (_, Json(mut pool)) = create_pool(State(state.clone()), Json(make_body("busy", &[("pods", "1")])))
            .await
            .unwrap();
        pool.status.assign_namespaces(vec!["solar-dev".to_string()]);
        typed::put(state.store.as_ref(), &ResourceKind::ResourcePool.key("", "busy"), &pool)
            .await
            .unwrap();
        let response = delete_pool(State(state.clone()), Path("busy".to_string())).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let Json(pool) = get_pool(State(state), Path("busy".to_string())).await.unwrap();
        assert!(pool.is_deleting());
    }
}

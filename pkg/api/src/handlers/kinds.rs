use axum::{Json, extract::State};
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KindInfo {
    pub kind: String,
    pub plural: &'static str,
    pub namespaced: bool,
}

/// GET /api/v1/kinds — the resource kinds this server serves.
pub async fn list_kinds(State(state): State<AppState>) -> Json<Vec<KindInfo>> {
    Json(
        state
            .registry
            .kinds()
            .map(|kind| KindInfo {
                kind: kind.to_string(),
                plural: kind.plural(),
                namespaced: kind.is_namespaced(),
            })
            .collect(),
    )
}

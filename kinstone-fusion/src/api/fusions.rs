//! Fusion endpoints

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::ApiResult;
use crate::fusion::{FusionOutcome, FusionRequest, HistoryFilter};
use crate::pagination::Page;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct OwnerQuery {
    pub user_id: Uuid,
}

/// Query parameters for GET /api/v1/users/:user_id/fusions
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub success_only: Option<bool>,
    pub shape_family: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// POST /api/v1/fusions
///
/// Every committed attempt answers 200, whether or not the pieces fused.
/// Validation, ownership and lock failures answer 400.
pub async fn attempt_fusion(
    State(state): State<AppState>,
    payload: Result<Json<FusionRequest>, JsonRejection>,
) -> ApiResult<Json<FusionOutcome>> {
    let Json(request) = payload?;
    let outcome = state.engine.attempt(&request).await?;
    Ok(Json(outcome))
}

/// GET /api/v1/fusions/:fusion_id?user_id=
pub async fn get_fusion(
    State(state): State<AppState>,
    fusion_id: Result<Path<Uuid>, PathRejection>,
    query: Result<Query<OwnerQuery>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Path(fusion_id) = fusion_id?;
    let Query(owner) = query?;

    let fusion = state.history.get(fusion_id, owner.user_id).await?;
    Ok(Json(json!({ "fusion": fusion })))
}

/// GET /api/v1/users/:user_id/fusions
pub async fn fusion_history(
    State(state): State<AppState>,
    user_id: Result<Path<Uuid>, PathRejection>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Path(user_id) = user_id?;
    let Query(query) = query?;

    let filter = HistoryFilter {
        success_only: query.success_only.unwrap_or(false),
        shape_family: query.shape_family,
    };
    let page = Page::new(query.limit, query.offset);

    let fusions = state.history.history(user_id, &filter, page).await?;
    Ok(Json(json!({
        "fusions": fusions,
        "count": fusions.len(),
        "limit": page.limit,
        "offset": page.offset,
    })))
}

/// GET /api/v1/users/:user_id/fusions/stats
pub async fn fusion_stats(
    State(state): State<AppState>,
    user_id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<Value>> {
    let Path(user_id) = user_id?;
    let stats = state.history.stats(user_id).await?;
    Ok(Json(json!({ "stats": stats })))
}

pub fn fusion_routes() -> Router<AppState> {
    Router::new()
        .route("/fusions", post(attempt_fusion))
        .route("/fusions/:fusion_id", get(get_fusion))
        .route("/users/:user_id/fusions", get(fusion_history))
        .route("/users/:user_id/fusions/stats", get(fusion_stats))
}

//! Inventory endpoints

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use kinstone_common::db::Provenance;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::pagination::{Page, PageQuery};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct AddEntryRequest {
    pub piece_id: Uuid,
    #[serde(default)]
    pub provenance: Provenance,
}

#[derive(Debug, Deserialize)]
pub struct SetCapacityRequest {
    pub capacity: i64,
}

#[derive(Debug, Deserialize)]
pub struct SetLocksRequest {
    pub entry_ids: Vec<Uuid>,
    pub locked: bool,
}

/// GET /api/v1/inventory/:user_id
///
/// Inventory summary with a page of entries, newest first.
pub async fn get_inventory(
    State(state): State<AppState>,
    user_id: Result<Path<Uuid>, PathRejection>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Path(user_id) = user_id?;
    let Query(query) = query?;

    let inventory = state.ledger.get_inventory(user_id, Page::from(&query)).await?;
    Ok(Json(json!({ "inventory": inventory })))
}

/// POST /api/v1/inventory/:user_id
///
/// 201 `{entry}`; 400 when the inventory is full or the piece is unknown/inactive.
pub async fn add_entry(
    State(state): State<AppState>,
    user_id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<AddEntryRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let Path(user_id) = user_id?;
    let Json(request) = payload?;

    let entry = state
        .ledger
        .add_entry(user_id, request.piece_id, request.provenance)
        .await
        .map_err(ApiError::missing_as_bad_request)?;

    Ok((StatusCode::CREATED, Json(json!({ "entry": entry }))))
}

/// DELETE /api/v1/inventory/:user_id/entries/:entry_id
pub async fn remove_entry(
    State(state): State<AppState>,
    ids: Result<Path<(Uuid, Uuid)>, PathRejection>,
) -> ApiResult<Json<Value>> {
    let Path((user_id, entry_id)) = ids?;

    let removed = state.ledger.remove_entries(user_id, &[entry_id]).await?;
    Ok(Json(json!({ "removed": removed })))
}

/// PUT /api/v1/inventory/:user_id/capacity
pub async fn set_capacity(
    State(state): State<AppState>,
    user_id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<SetCapacityRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Path(user_id) = user_id?;
    let Json(request) = payload?;

    let inventory = state.ledger.set_capacity(user_id, request.capacity).await?;
    Ok(Json(json!({ "inventory": inventory })))
}

/// POST /api/v1/inventory/:user_id/locks
pub async fn set_locks(
    State(state): State<AppState>,
    user_id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<SetLocksRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Path(user_id) = user_id?;
    let Json(request) = payload?;

    let updated = state
        .ledger
        .set_lock_status(user_id, &request.entry_ids, request.locked)
        .await?;
    Ok(Json(json!({ "updated": updated, "locked": request.locked })))
}

/// GET /api/v1/inventory/:user_id/stats
pub async fn inventory_stats(
    State(state): State<AppState>,
    user_id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<Value>> {
    let Path(user_id) = user_id?;
    let stats = state.ledger.stats(user_id).await?;
    Ok(Json(json!({ "stats": stats })))
}

/// GET /api/v1/inventory/:user_id/pairs
pub async fn fusion_pairs(
    State(state): State<AppState>,
    user_id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<Value>> {
    let Path(user_id) = user_id?;
    let pairs = state.ledger.available_pairs(user_id).await?;
    Ok(Json(json!({ "pairs": pairs, "count": pairs.len() })))
}

pub fn inventory_routes() -> Router<AppState> {
    Router::new()
        .route("/inventory/:user_id", get(get_inventory).post(add_entry))
        .route(
            "/inventory/:user_id/entries/:entry_id",
            delete(remove_entry),
        )
        .route("/inventory/:user_id/capacity", put(set_capacity))
        .route("/inventory/:user_id/locks", post(set_locks))
        .route("/inventory/:user_id/stats", get(inventory_stats))
        .route("/inventory/:user_id/pairs", get(fusion_pairs))
}

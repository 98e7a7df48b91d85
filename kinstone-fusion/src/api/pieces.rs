//! Catalog piece endpoints

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use kinstone_common::db::Rarity;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::catalog::{NewPiece, PieceFilter};
use crate::error::ApiResult;
use crate::pagination::Page;
use crate::AppState;

/// Query parameters for GET /api/v1/pieces
#[derive(Debug, Default, Deserialize)]
pub struct PieceListQuery {
    pub rarity: Option<Rarity>,
    pub shape_family: Option<String>,
    /// Comma-separated; a piece matches if it carries any of them
    pub tags: Option<String>,
    /// Defaults to true
    pub active_only: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub active: bool,
}

/// GET /api/v1/pieces
pub async fn list_pieces(
    State(state): State<AppState>,
    query: Result<Query<PieceListQuery>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Query(query) = query?;
    let filter = PieceFilter {
        rarity: query.rarity,
        shape_family: query.shape_family,
        tags: query
            .tags
            .as_deref()
            .map(split_tags)
            .unwrap_or_default(),
        active_only: query.active_only.unwrap_or(true),
    };
    let page = Page::new(query.limit, query.offset);

    let pieces = state.catalog.list_pieces(&filter, page).await?;
    Ok(Json(json!({
        "pieces": pieces,
        "count": pieces.len(),
        "limit": page.limit,
        "offset": page.offset,
    })))
}

fn split_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// POST /api/v1/pieces
pub async fn create_piece(
    State(state): State<AppState>,
    payload: Result<Json<NewPiece>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let Json(new_piece) = payload?;
    let piece = state.catalog.create_piece(new_piece).await?;
    Ok((StatusCode::CREATED, Json(json!({ "piece": piece }))))
}

/// GET /api/v1/pieces/:piece_id
pub async fn get_piece(
    State(state): State<AppState>,
    piece_id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<Value>> {
    let Path(piece_id) = piece_id?;
    let piece = state.catalog.get_piece(piece_id).await?;
    Ok(Json(json!({ "piece": piece })))
}

/// PUT /api/v1/pieces/:piece_id/active
pub async fn set_piece_active(
    State(state): State<AppState>,
    piece_id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<SetActiveRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Path(piece_id) = piece_id?;
    let Json(request) = payload?;
    let piece = state
        .catalog
        .set_piece_active(piece_id, request.active)
        .await?;
    Ok(Json(json!({ "piece": piece })))
}

pub fn piece_routes() -> Router<AppState> {
    Router::new()
        .route("/pieces", get(list_pieces).post(create_piece))
        .route("/pieces/:piece_id", get(get_piece))
        .route("/pieces/:piece_id/active", put(set_piece_active))
}

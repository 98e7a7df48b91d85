//! User endpoints

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::ApiResult;
use crate::pagination::{Page, PageQuery};
use crate::users::{NewUser, UserUpdate};
use crate::AppState;

/// GET /api/v1/users
///
/// Active users, newest first.
pub async fn list_users(
    State(state): State<AppState>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Query(query) = query?;
    let users = state.users.list_users(Page::from(&query)).await?;
    Ok(Json(json!({ "users": users })))
}

/// POST /api/v1/users
///
/// Creates the user and its inventory. Returns 201 `{user}`.
pub async fn create_user(
    State(state): State<AppState>,
    payload: Result<Json<NewUser>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let Json(new_user) = payload?;
    let user = state.users.create_user(new_user).await?;
    Ok((StatusCode::CREATED, Json(json!({ "user": user }))))
}

/// GET /api/v1/users/:user_id
pub async fn get_user(
    State(state): State<AppState>,
    user_id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<Value>> {
    let Path(user_id) = user_id?;
    let user = state.users.get_user(user_id).await?;
    Ok(Json(json!({ "user": user })))
}

/// PUT /api/v1/users/:user_id
pub async fn update_user(
    State(state): State<AppState>,
    user_id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UserUpdate>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Path(user_id) = user_id?;
    let Json(update) = payload?;
    let user = state.users.update_user(user_id, update).await?;
    Ok(Json(json!({ "user": user })))
}

/// DELETE /api/v1/users/:user_id
///
/// Soft delete; the user's records are kept.
pub async fn deactivate_user(
    State(state): State<AppState>,
    user_id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<Value>> {
    let Path(user_id) = user_id?;
    state.users.deactivate_user(user_id).await?;
    Ok(Json(json!({ "deactivated": user_id })))
}

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/:user_id",
            get(get_user).put(update_user).delete(deactivate_user),
        )
}

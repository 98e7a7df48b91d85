//! Reward endpoints

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    routing::{get, post},
    Json, Router,
};
use kinstone_common::db::{RewardStatus, RewardType};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::api::fusions::OwnerQuery;
use crate::error::ApiResult;
use crate::pagination::Page;
use crate::rewards::RewardFilter;
use crate::AppState;

/// Query parameters for GET /api/v1/users/:user_id/rewards
#[derive(Debug, Default, Deserialize)]
pub struct RewardListQuery {
    pub status: Option<RewardStatus>,
    pub reward_type: Option<RewardType>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ClaimRequest {
    pub user_id: Uuid,
}

/// GET /api/v1/users/:user_id/rewards
pub async fn list_rewards(
    State(state): State<AppState>,
    user_id: Result<Path<Uuid>, PathRejection>,
    query: Result<Query<RewardListQuery>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Path(user_id) = user_id?;
    let Query(query) = query?;

    let filter = RewardFilter {
        status: query.status,
        reward_type: query.reward_type,
    };
    let page = Page::new(query.limit, query.offset);

    let rewards = state.rewards.list(user_id, &filter, page).await?;
    Ok(Json(json!({
        "rewards": rewards,
        "count": rewards.len(),
        "limit": page.limit,
        "offset": page.offset,
    })))
}

/// GET /api/v1/users/:user_id/rewards/stats
pub async fn reward_stats(
    State(state): State<AppState>,
    user_id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<Value>> {
    let Path(user_id) = user_id?;
    let stats = state.rewards.stats(user_id).await?;
    Ok(Json(json!({ "stats": stats })))
}

/// POST /api/v1/users/:user_id/rewards/claim
///
/// Claims every pending reward. An empty `claimed` list is not an error.
pub async fn claim_all(
    State(state): State<AppState>,
    user_id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<Value>> {
    let Path(user_id) = user_id?;
    let claimed = state.rewards.claim_all_pending(user_id).await?;
    Ok(Json(json!({ "claimed": claimed, "count": claimed.len() })))
}

/// GET /api/v1/rewards/:reward_id?user_id=
pub async fn get_reward(
    State(state): State<AppState>,
    reward_id: Result<Path<Uuid>, PathRejection>,
    query: Result<Query<OwnerQuery>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Path(reward_id) = reward_id?;
    let Query(owner) = query?;

    let reward = state.rewards.get(reward_id, owner.user_id).await?;
    Ok(Json(json!({ "reward": reward })))
}

/// POST /api/v1/rewards/:reward_id/claim
pub async fn claim_reward(
    State(state): State<AppState>,
    reward_id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<ClaimRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Path(reward_id) = reward_id?;
    let Json(request) = payload?;

    let reward = state.rewards.claim(reward_id, request.user_id).await?;
    Ok(Json(json!({ "reward": reward })))
}

/// POST /api/v1/rewards/:reward_id/consume
pub async fn consume_reward(
    State(state): State<AppState>,
    reward_id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<Value>> {
    let Path(reward_id) = reward_id?;
    let reward = state.rewards.mark_consumed(reward_id).await?;
    Ok(Json(json!({ "reward": reward })))
}

pub fn reward_routes() -> Router<AppState> {
    Router::new()
        .route("/users/:user_id/rewards", get(list_rewards))
        .route("/users/:user_id/rewards/stats", get(reward_stats))
        .route("/users/:user_id/rewards/claim", post(claim_all))
        .route("/rewards/:reward_id", get(get_reward))
        .route("/rewards/:reward_id/claim", post(claim_reward))
        .route("/rewards/:reward_id/consume", post(consume_reward))
}

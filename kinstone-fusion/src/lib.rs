//! kinstone-fusion library - atomic fusion transaction engine
//!
//! Components, leaves first:
//! - [`locks`]: ordered, exclusive in-process locks on inventory entries
//! - [`ledger`]: inventory capacity ledger and entry add/remove
//! - [`rewards`]: reward lifecycle (pending -> claimed -> consumed)
//! - [`fusion`]: the fusion engine and its audit log
//!
//! [`catalog`] and [`users`] hold the supporting records; [`api`] exposes all
//! of it over HTTP.

use axum::Router;
use chrono::{DateTime, Utc};
use kinstone_common::config::FusionConfig;
use sqlx::SqlitePool;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod catalog;
pub mod error;
pub mod fusion;
pub mod ledger;
pub mod locks;
pub mod pagination;
pub mod rewards;
pub mod store;
pub mod users;

use catalog::Catalog;
use fusion::{FusionEngine, FusionHistory};
use ledger::InventoryLedger;
use locks::EntryLocks;
use rewards::RewardIssuer;
use users::Users;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    pub catalog: Catalog,
    pub users: Users,
    pub ledger: InventoryLedger,
    pub engine: FusionEngine,
    pub history: FusionHistory,
    pub rewards: RewardIssuer,
    /// Service startup timestamp, for uptime reporting
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    /// Wire every component onto one pool and one entry lock table
    pub fn new(db: SqlitePool, config: &FusionConfig) -> Self {
        let locks = EntryLocks::new(config.locks.wait_timeout());

        Self {
            catalog: Catalog::new(db.clone()),
            users: Users::new(db.clone(), config.default_inventory_capacity),
            ledger: InventoryLedger::new(db.clone(), locks.clone()),
            engine: FusionEngine::new(db.clone(), locks),
            history: FusionHistory::new(db.clone()),
            rewards: RewardIssuer::new(db.clone()),
            startup_time: Utc::now(),
            db,
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .merge(api::user_routes())
        .merge(api::piece_routes())
        .merge(api::inventory_routes())
        .merge(api::fusion_routes())
        .merge(api::reward_routes());

    Router::new()
        .merge(api::health_routes())
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

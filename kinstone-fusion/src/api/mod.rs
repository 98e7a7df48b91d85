//! HTTP API handlers
//!
//! Each submodule contributes a `*_routes()` router; [`crate::build_router`]
//! nests them under `/api/v1`.

pub mod fusions;
pub mod health;
pub mod inventory;
pub mod pieces;
pub mod rewards;
pub mod users;

pub use fusions::fusion_routes;
pub use health::health_routes;
pub use inventory::inventory_routes;
pub use pieces::piece_routes;
pub use rewards::reward_routes;
pub use users::user_routes;

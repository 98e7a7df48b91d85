//! Test helper utilities
//!
//! Shared setup for kinstone-fusion integration tests: a file-backed database
//! in a temp dir, plus seeding for users, catalog pieces and entries.

#![allow(dead_code)]

use anyhow::Result;
use kinstone_common::config::FusionConfig;
use kinstone_common::db::{init_database, Half, Provenance, Rarity};
use kinstone_fusion::catalog::NewPiece;
use kinstone_fusion::users::NewUser;
use kinstone_fusion::AppState;
use sqlx::SqlitePool;
use tempfile::TempDir;
use uuid::Uuid;

/// Temp database plus fully wired application state
///
/// `_temp_dir` must stay alive for the duration of the test.
pub struct TestContext {
    pub _temp_dir: TempDir,
    pub pool: SqlitePool,
    pub state: AppState,
}

/// Create a fresh database with schema and migrations applied
pub async fn create_test_context() -> Result<TestContext> {
    let mut config = FusionConfig::default();
    config.locks.wait_timeout_ms = 2000;
    create_test_context_with(config).await
}

pub async fn create_test_context_with(config: FusionConfig) -> Result<TestContext> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("kinstone_test.db");

    let pool = init_database(&db_path, &config.database).await?;
    let state = AppState::new(pool.clone(), &config);

    Ok(TestContext {
        _temp_dir: temp_dir,
        pool,
        state,
    })
}

/// Create a user with an inventory of the given capacity
pub async fn create_user(state: &AppState, capacity: i64) -> Uuid {
    state
        .users
        .create_user(NewUser {
            handle: None,
            display_name: None,
            inventory_capacity: Some(capacity),
        })
        .await
        .unwrap()
        .user
        .id
}

/// Add an active catalog piece
pub async fn create_piece(
    state: &AppState,
    shape_family: &str,
    half: Half,
    rarity: Rarity,
) -> Uuid {
    state
        .catalog
        .create_piece(NewPiece {
            shape_family: shape_family.to_string(),
            half,
            rarity: Some(rarity),
            name: format!("{}-{} ({})", shape_family, half, rarity),
            description: None,
            tags: vec![],
        })
        .await
        .unwrap()
        .id
}

/// Put one entry of `piece_id` into the user's inventory
pub async fn grant(state: &AppState, user_id: Uuid, piece_id: Uuid) -> Uuid {
    state
        .ledger
        .add_entry(user_id, piece_id, Provenance::Grant)
        .await
        .unwrap()
        .entry
        .id
}

/// Live entry count, read straight from the table
pub async fn live_entries(pool: &SqlitePool, user_id: Uuid) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM inventory_entries WHERE owner_id = ?")
        .bind(user_id.to_string())
        .fetch_one(pool)
        .await
        .unwrap()
}

/// `current_usage` column, read straight from the table
pub async fn current_usage(pool: &SqlitePool, user_id: Uuid) -> i64 {
    sqlx::query_scalar("SELECT current_usage FROM inventories WHERE user_id = ?")
        .bind(user_id.to_string())
        .fetch_one(pool)
        .await
        .unwrap()
}

pub async fn count_rows(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .unwrap()
}

pub async fn entry_exists(pool: &SqlitePool, entry_id: Uuid) -> bool {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM inventory_entries WHERE id = ?")
        .bind(entry_id.to_string())
        .fetch_one(pool)
        .await
        .unwrap();
    count == 1
}

/// Assert the ledger invariant for one owner
pub async fn assert_ledger_balanced(pool: &SqlitePool, user_id: Uuid) {
    let usage = current_usage(pool, user_id).await;
    let live = live_entries(pool, user_id).await;
    assert_eq!(usage, live, "current_usage {} != live entries {}", usage, live);
}

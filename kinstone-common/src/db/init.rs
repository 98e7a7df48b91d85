//! Database initialization
//!
//! Opens (or creates) the SQLite store, configures every pooled connection and
//! creates the fusion schema. Table creation is idempotent; versioned changes
//! live in [`crate::db::migrations`].

use crate::config::DatabaseConfig;
use crate::Result;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;
use tracing::info;

/// Open the database at `db_path`, create the schema and run migrations
pub async fn init_database(db_path: &Path, config: &DatabaseConfig) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let pool = create_pool(db_path, config).await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;
    crate::db::migrations::run_migrations(&pool).await?;

    Ok(pool)
}

/// Create the connection pool
///
/// Per-connection settings: WAL journal, NORMAL sync, foreign keys, busy_timeout.
/// The pool acquire timeout bounds how long an operation waits for a connection.
pub async fn create_pool(db_path: &Path, config: &DatabaseConfig) -> Result<SqlitePool> {
    tracing::debug!(
        "Creating database pool: {} connections, busy_timeout={}ms",
        config.max_connections,
        config.busy_timeout_ms
    );

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(config.busy_timeout());

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout())
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Create every table used by the fusion service
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;
    create_users_table(pool).await?;
    create_inventories_table(pool).await?;
    create_pieces_table(pool).await?;
    create_inventory_entries_table(pool).await?;
    create_fusions_table(pool).await?;
    create_rewards_table(pool).await?;
    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            handle TEXT UNIQUE,
            display_name TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// One inventory per user; usage is maintained by the ledger
async fn create_inventories_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS inventories (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
            capacity INTEGER NOT NULL CHECK (capacity >= 1),
            current_usage INTEGER NOT NULL DEFAULT 0
                CHECK (current_usage >= 0 AND current_usage <= capacity),
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_pieces_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pieces (
            id TEXT PRIMARY KEY,
            shape_family TEXT NOT NULL,
            half TEXT NOT NULL CHECK (half IN ('A', 'B')),
            rarity TEXT NOT NULL DEFAULT 'common'
                CHECK (rarity IN ('common', 'uncommon', 'rare', 'epic', 'legendary')),
            name TEXT NOT NULL,
            description TEXT,
            tags TEXT NOT NULL DEFAULT '[]',
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// `serial_number` is the rowid with AUTOINCREMENT: strictly increasing, never reused
async fn create_inventory_entries_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS inventory_entries (
            serial_number INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            owner_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            piece_id TEXT NOT NULL REFERENCES pieces(id),
            provenance TEXT NOT NULL DEFAULT 'drop'
                CHECK (provenance IN ('drop', 'reward', 'grant', 'admin')),
            is_locked INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Append-only audit of fusion attempts. Entry ids are not foreign keys:
/// consumed entries are deleted while their fusion record stays.
async fn create_fusions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS fusions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id),
            input_entry_1_id TEXT NOT NULL,
            input_entry_2_id TEXT NOT NULL,
            input_piece_1_id TEXT NOT NULL REFERENCES pieces(id),
            input_piece_2_id TEXT NOT NULL REFERENCES pieces(id),
            shape_family TEXT NOT NULL,
            is_success INTEGER NOT NULL,
            score_value INTEGER NOT NULL DEFAULT 0 CHECK (score_value >= 0),
            created_at TEXT NOT NULL,
            CHECK (input_entry_1_id <> input_entry_2_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_rewards_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS rewards (
            id TEXT PRIMARY KEY,
            fusion_id TEXT NOT NULL UNIQUE REFERENCES fusions(id),
            user_id TEXT NOT NULL REFERENCES users(id),
            reward_type TEXT NOT NULL
                CHECK (reward_type IN ('points', 'coins', 'cosmetic', 'lootbox', 'event_trigger')),
            reward_value TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'claimed', 'consumed')),
            claimed_at TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

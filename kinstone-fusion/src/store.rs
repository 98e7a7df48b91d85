//! Unit-of-work helpers for the SQLite store

use kinstone_common::Result;
use sqlx::{Sqlite, SqlitePool, Transaction};

/// Open a write transaction with `BEGIN IMMEDIATE`
///
/// The write lock is taken up front, so a deferred transaction never has to
/// upgrade from reader to writer mid-flight. Dropping the returned transaction
/// without committing rolls it back.
pub async fn begin_write(pool: &SqlitePool) -> Result<Transaction<'static, Sqlite>> {
    Ok(pool.begin_with("BEGIN IMMEDIATE").await?)
}

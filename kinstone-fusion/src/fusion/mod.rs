//! Fusion engine
//!
//! One fusion attempt is one unit of work:
//!
//! 1. Reject a request naming the same entry twice.
//! 2. Lock both entries (ascending id order), then open a write transaction.
//! 3. Re-read both entries under the lock. They must exist, belong to the
//!    user and be unlocked, or the attempt fails `Conflict`.
//! 4. Reject two entries of the same catalog piece.
//! 5. Evaluate compatibility, score and reward tier.
//! 6. Record the attempt; on success consume both entries and issue the reward.
//! 7. Verify the ledger and commit.
//!
//! Any error after step 2 drops the transaction, which rolls back every write
//! made so far, and then releases the locks.

pub mod history;
pub mod rules;

use crate::ledger::{delete_entries, ensure_usage_consistent};
use crate::locks::EntryLocks;
use crate::rewards::insert_reward;
use crate::store::begin_write;
use kinstone_common::db::rows::{entry_from_row, piece_from_row};
use kinstone_common::db::{FusionRecord, FusionWithPieces, InventoryEntry, Piece, Reward};
use kinstone_common::{time, uuid_utils, Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

pub use history::{FusionHistory, FusionStats, HistoryFilter};

#[derive(Debug, Clone, Deserialize)]
pub struct FusionRequest {
    pub user_id: Uuid,
    pub entry_id_1: Uuid,
    pub entry_id_2: Uuid,
}

/// Committed result of one attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FusionOutcome {
    /// The audit record with both input pieces as they were before consumption
    pub fusion: FusionWithPieces,
    pub reward: Option<Reward>,
    /// Entry ids removed from the inventory; empty for a failed fusion
    pub consumed_pieces: Vec<Uuid>,
}

#[derive(Clone)]
pub struct FusionEngine {
    db: SqlitePool,
    locks: EntryLocks,
}

impl FusionEngine {
    pub fn new(db: SqlitePool, locks: EntryLocks) -> Self {
        Self { db, locks }
    }

    pub async fn attempt(&self, request: &FusionRequest) -> Result<FusionOutcome> {
        let FusionRequest {
            user_id,
            entry_id_1,
            entry_id_2,
        } = *request;

        if entry_id_1 == entry_id_2 {
            debug!(user_id = %user_id, entry_id = %entry_id_1, "Rejected self-fusion");
            return Err(Error::InvalidInput(
                "cannot fuse an entry with itself".to_string(),
            ));
        }

        let _locks = self.locks.acquire(&[entry_id_1, entry_id_2]).await?;
        let mut tx = begin_write(&self.db).await?;

        let (entry_1, entry_2) =
            load_fusable_entries(&mut tx, user_id, entry_id_1, entry_id_2).await?;

        if entry_1.piece_id == entry_2.piece_id {
            debug!(user_id = %user_id, piece_id = %entry_1.piece_id, "Rejected identical pieces");
            return Err(Error::InvalidInput("cannot fuse identical pieces".to_string()));
        }

        let piece_1 = load_piece(&mut tx, entry_1.piece_id).await?;
        let piece_2 = load_piece(&mut tx, entry_2.piece_id).await?;

        let evaluation = rules::evaluate(&piece_1, &piece_2);

        let record = FusionRecord {
            id: uuid_utils::generate(),
            user_id,
            input_entry_1_id: entry_1.id,
            input_entry_2_id: entry_2.id,
            input_piece_1_id: piece_1.id,
            input_piece_2_id: piece_2.id,
            shape_family: piece_1.shape_family.clone(),
            is_success: evaluation.is_success,
            score_value: evaluation.score_value,
            created_at: time::now(),
        };
        insert_fusion(&mut tx, &record).await?;

        let mut consumed_pieces = Vec::new();
        let mut reward = None;
        if evaluation.is_success {
            let inputs = [entry_1.id, entry_2.id];
            consumed_pieces = delete_entries(&mut tx, user_id, &inputs).await?;
            if let Some(value) = evaluation.reward {
                reward = Some(insert_reward(&mut tx, record.id, user_id, value).await?);
            }
        }

        ensure_usage_consistent(&mut tx, user_id).await?;
        tx.commit().await?;

        info!(
            fusion_id = %record.id,
            user_id = %user_id,
            shape_family = %record.shape_family,
            is_success = record.is_success,
            score_value = record.score_value,
            reward_id = ?reward.as_ref().map(|r| r.id),
            "Fusion attempt recorded"
        );

        Ok(FusionOutcome {
            fusion: FusionWithPieces {
                fusion: record,
                input_piece_1: piece_1.snapshot(),
                input_piece_2: piece_2.snapshot(),
            },
            reward,
            consumed_pieces,
        })
    }
}

/// Both entries, in the caller's order, provided they exist, belong to the
/// user and are unlocked
async fn load_fusable_entries(
    conn: &mut SqliteConnection,
    user_id: Uuid,
    entry_id_1: Uuid,
    entry_id_2: Uuid,
) -> Result<(InventoryEntry, InventoryEntry)> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM inventory_entries
        WHERE id IN (?, ?) AND owner_id = ? AND is_locked = 0
        "#,
    )
    .bind(entry_id_1.to_string())
    .bind(entry_id_2.to_string())
    .bind(user_id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    let mut entries = rows.iter().map(entry_from_row).collect::<Result<Vec<_>>>()?;

    let position_2 = entries.iter().position(|e| e.id == entry_id_2);
    let entry_2 = position_2.map(|i| entries.swap_remove(i));
    let entry_1 = entries.into_iter().find(|e| e.id == entry_id_1);

    match (entry_1, entry_2) {
        (Some(entry_1), Some(entry_2)) => Ok((entry_1, entry_2)),
        _ => {
            debug!(
                user_id = %user_id,
                entry_id_1 = %entry_id_1,
                entry_id_2 = %entry_id_2,
                "Fusion inputs unavailable"
            );
            Err(Error::Conflict(
                "one or both pieces not found, not owned by user, or locked".to_string(),
            ))
        }
    }
}

async fn load_piece(conn: &mut SqliteConnection, piece_id: Uuid) -> Result<Piece> {
    let row = sqlx::query("SELECT * FROM pieces WHERE id = ?")
        .bind(piece_id.to_string())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| Error::Internal(format!("entry references missing piece {}", piece_id)))?;

    piece_from_row(&row)
}

async fn insert_fusion(conn: &mut SqliteConnection, record: &FusionRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO fusions (
            id, user_id, input_entry_1_id, input_entry_2_id,
            input_piece_1_id, input_piece_2_id, shape_family,
            is_success, score_value, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(record.id.to_string())
    .bind(record.user_id.to_string())
    .bind(record.input_entry_1_id.to_string())
    .bind(record.input_entry_2_id.to_string())
    .bind(record.input_piece_1_id.to_string())
    .bind(record.input_piece_2_id.to_string())
    .bind(&record.shape_family)
    .bind(record.is_success)
    .bind(record.score_value)
    .bind(record.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

//! Inventory ledger
//!
//! Owns the invariant that an owner's `current_usage` equals the number of
//! live entries in their inventory and never exceeds `capacity`. Every path
//! that inserts or deletes entries goes through [`insert_entry`] or
//! [`delete_entries`], which adjust usage in the same statement sequence, and
//! calls [`ensure_usage_consistent`] before its transaction commits.
//!
//! The free functions take the caller's transaction connection so the fusion
//! engine can fold them into its own unit of work.

use crate::locks::EntryLocks;
use crate::pagination::Page;
use crate::store::begin_write;
use kinstone_common::db::rows::{entry_from_row, inventory_from_row, snapshot_from_row};
use kinstone_common::db::{
    Half, Inventory, InventoryEntry, InventoryEntryWithPiece, InventoryWithEntries, Provenance,
    Rarity,
};
use kinstone_common::{time, uuid_utils, Error, Result};
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::BTreeMap;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Entry columns joined with the `p_`-prefixed piece snapshot
const ENTRY_WITH_PIECE_SELECT: &str = r#"
    SELECT e.id, e.owner_id, e.piece_id, e.provenance, e.is_locked, e.serial_number,
           e.created_at,
           p.name AS p_name, p.shape_family AS p_shape_family, p.half AS p_half,
           p.rarity AS p_rarity
    FROM inventory_entries e
    JOIN pieces p ON p.id = e.piece_id
"#;

/// Capacity and usage summary for one inventory
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InventoryStats {
    pub user_id: Uuid,
    pub capacity: i64,
    pub current_usage: i64,
    pub available_slots: i64,
    pub locked_entries: i64,
    pub by_rarity: BTreeMap<Rarity, i64>,
    pub shape_families: Vec<String>,
}

/// Two unlocked entries that would fuse successfully
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FusionPair {
    pub shape_family: String,
    pub entry_1: InventoryEntryWithPiece,
    pub entry_2: InventoryEntryWithPiece,
}

/// Pool-backed front end for inventory mutations and reads
#[derive(Clone)]
pub struct InventoryLedger {
    db: SqlitePool,
    locks: EntryLocks,
}

impl InventoryLedger {
    pub fn new(db: SqlitePool, locks: EntryLocks) -> Self {
        Self { db, locks }
    }

    /// Add one entry of `piece_id` to the owner's inventory
    ///
    /// Fails `NotFound` for an unknown owner or an unknown/inactive piece and
    /// `CapacityExceeded` when the inventory is full.
    pub async fn add_entry(
        &self,
        owner_id: Uuid,
        piece_id: Uuid,
        provenance: Provenance,
    ) -> Result<InventoryEntryWithPiece> {
        let mut tx = begin_write(&self.db).await?;

        let active: Option<bool> =
            sqlx::query_scalar("SELECT is_active FROM pieces WHERE id = ?")
                .bind(piece_id.to_string())
                .fetch_optional(&mut *tx)
                .await?;
        if active != Some(true) {
            return Err(Error::NotFound(format!("piece {} not found or inactive", piece_id)));
        }

        let entry = insert_entry(&mut tx, owner_id, piece_id, provenance).await?;
        ensure_usage_consistent(&mut tx, owner_id).await?;
        let added = fetch_entry(&mut tx, owner_id, entry.id)
            .await?
            .ok_or_else(|| Error::Internal(format!("entry {} vanished after insert", entry.id)))?;

        tx.commit().await?;

        info!(
            user_id = %owner_id,
            entry_id = %entry.id,
            piece_id = %piece_id,
            serial_number = entry.serial_number,
            "Added inventory entry"
        );

        Ok(added)
    }

    /// Delete the owner's entries and release their slots
    ///
    /// All or nothing: fails `Conflict` if any entry is missing, locked or owned
    /// by someone else.
    pub async fn remove_entries(&self, owner_id: Uuid, entry_ids: &[Uuid]) -> Result<Vec<Uuid>> {
        if entry_ids.is_empty() {
            return Err(Error::InvalidInput("no entries given".to_string()));
        }

        let _locks = self.locks.acquire(entry_ids).await?;
        let mut tx = begin_write(&self.db).await?;

        let removed = delete_entries(&mut tx, owner_id, entry_ids).await?;
        ensure_usage_consistent(&mut tx, owner_id).await?;

        tx.commit().await?;

        info!(user_id = %owner_id, count = removed.len(), "Removed inventory entries");
        Ok(removed)
    }

    /// Change the owner's capacity; never below current usage or 1
    pub async fn set_capacity(&self, owner_id: Uuid, new_capacity: i64) -> Result<Inventory> {
        if new_capacity < 1 {
            return Err(Error::InvalidInput(format!(
                "capacity must be at least 1, got {}",
                new_capacity
            )));
        }

        let mut tx = begin_write(&self.db).await?;

        let inventory = fetch_inventory(&mut tx, owner_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("inventory for user {}", owner_id)))?;

        if new_capacity < inventory.current_usage {
            return Err(Error::InvalidInput(format!(
                "capacity {} is below current usage {}",
                new_capacity, inventory.current_usage
            )));
        }

        sqlx::query("UPDATE inventories SET capacity = ?, updated_at = ? WHERE user_id = ?")
            .bind(new_capacity)
            .bind(time::now())
            .bind(owner_id.to_string())
            .execute(&mut *tx)
            .await?;

        let updated = fetch_inventory(&mut tx, owner_id)
            .await?
            .ok_or_else(|| Error::Internal(format!("inventory for user {} vanished", owner_id)))?;

        tx.commit().await?;

        info!(
            user_id = %owner_id,
            old_capacity = inventory.capacity,
            new_capacity,
            "Inventory capacity changed"
        );

        Ok(updated)
    }

    /// Lock or unlock the owner's entries; returns how many rows changed
    ///
    /// Ids that do not belong to the owner are ignored.
    pub async fn set_lock_status(
        &self,
        owner_id: Uuid,
        entry_ids: &[Uuid],
        locked: bool,
    ) -> Result<u64> {
        if entry_ids.is_empty() {
            return Err(Error::InvalidInput("no entries given".to_string()));
        }

        let lock_set = self.locks.acquire(entry_ids).await?;
        let mut tx = begin_write(&self.db).await?;

        let mut updated = 0;
        for id in lock_set.ids() {
            updated += sqlx::query(
                "UPDATE inventory_entries SET is_locked = ? WHERE id = ? AND owner_id = ?",
            )
            .bind(locked)
            .bind(id.to_string())
            .bind(owner_id.to_string())
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }

        tx.commit().await?;

        debug!(user_id = %owner_id, locked, updated, "Updated entry lock status");
        Ok(updated)
    }

    /// Inventory summary plus a page of entries, newest first
    pub async fn get_inventory(&self, owner_id: Uuid, page: Page) -> Result<InventoryWithEntries> {
        let mut conn = self.db.acquire().await?;

        let inventory = fetch_inventory(&mut conn, owner_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("inventory for user {}", owner_id)))?;

        let sql = format!(
            "{} WHERE e.owner_id = ? ORDER BY e.serial_number DESC LIMIT ? OFFSET ?",
            ENTRY_WITH_PIECE_SELECT
        );
        let rows = sqlx::query(&sql)
            .bind(owner_id.to_string())
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&mut *conn)
            .await?;

        let entries = rows
            .iter()
            .map(entry_with_piece_from_row)
            .collect::<Result<Vec<_>>>()?;

        Ok(InventoryWithEntries { inventory, entries })
    }

    pub async fn get_entry(
        &self,
        owner_id: Uuid,
        entry_id: Uuid,
    ) -> Result<InventoryEntryWithPiece> {
        let mut conn = self.db.acquire().await?;
        fetch_entry(&mut conn, owner_id, entry_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("entry {} for user {}", entry_id, owner_id)))
    }

    pub async fn stats(&self, owner_id: Uuid) -> Result<InventoryStats> {
        let mut conn = self.db.acquire().await?;

        let inventory = fetch_inventory(&mut conn, owner_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("inventory for user {}", owner_id)))?;

        let mut by_rarity: BTreeMap<Rarity, i64> = Rarity::ALL.iter().map(|r| (*r, 0)).collect();
        let rarity_counts: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT p.rarity, COUNT(*)
            FROM inventory_entries e
            JOIN pieces p ON p.id = e.piece_id
            WHERE e.owner_id = ?
            GROUP BY p.rarity
            "#,
        )
        .bind(owner_id.to_string())
        .fetch_all(&mut *conn)
        .await?;
        for (rarity, count) in rarity_counts {
            let rarity: Rarity = rarity
                .parse()
                .map_err(|e| Error::Internal(format!("bad rarity in catalog: {}", e)))?;
            by_rarity.insert(rarity, count);
        }

        let locked_entries: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM inventory_entries WHERE owner_id = ? AND is_locked = 1",
        )
        .bind(owner_id.to_string())
        .fetch_one(&mut *conn)
        .await?;

        let shape_families: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT p.shape_family
            FROM inventory_entries e
            JOIN pieces p ON p.id = e.piece_id
            WHERE e.owner_id = ?
            ORDER BY p.shape_family
            "#,
        )
        .bind(owner_id.to_string())
        .fetch_all(&mut *conn)
        .await?;

        Ok(InventoryStats {
            user_id: owner_id,
            capacity: inventory.capacity,
            current_usage: inventory.current_usage,
            available_slots: inventory.capacity - inventory.current_usage,
            locked_entries,
            by_rarity,
            shape_families,
        })
    }

    /// Every unordered pair of unlocked entries that would fuse successfully
    ///
    /// Within a pair the half-A entry comes first.
    pub async fn available_pairs(&self, owner_id: Uuid) -> Result<Vec<FusionPair>> {
        let mut conn = self.db.acquire().await?;

        if fetch_inventory(&mut conn, owner_id).await?.is_none() {
            return Err(Error::NotFound(format!("inventory for user {}", owner_id)));
        }

        let sql = format!(
            "{} WHERE e.owner_id = ? AND e.is_locked = 0 ORDER BY p.shape_family, e.serial_number",
            ENTRY_WITH_PIECE_SELECT
        );
        let rows = sqlx::query(&sql)
            .bind(owner_id.to_string())
            .fetch_all(&mut *conn)
            .await?;
        let entries = rows
            .iter()
            .map(entry_with_piece_from_row)
            .collect::<Result<Vec<_>>>()?;

        let mut pairs = Vec::new();
        for (i, first) in entries.iter().enumerate() {
            for second in &entries[i + 1..] {
                if first.entry.piece_id == second.entry.piece_id
                    || first.piece.shape_family != second.piece.shape_family
                    || first.piece.half == second.piece.half
                {
                    continue;
                }
                let (a, b) = if first.piece.half == Half::A {
                    (first, second)
                } else {
                    (second, first)
                };
                pairs.push(FusionPair {
                    shape_family: a.piece.shape_family.clone(),
                    entry_1: a.clone(),
                    entry_2: b.clone(),
                });
            }
        }

        Ok(pairs)
    }
}

fn entry_with_piece_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<InventoryEntryWithPiece> {
    Ok(InventoryEntryWithPiece {
        entry: entry_from_row(row)?,
        piece: snapshot_from_row(row, "p_")?,
    })
}

/// Read the owner's inventory row
pub async fn fetch_inventory(
    conn: &mut SqliteConnection,
    owner_id: Uuid,
) -> Result<Option<Inventory>> {
    let row = sqlx::query(
        r#"
        SELECT id AS inventory_id, user_id, capacity, current_usage,
               updated_at AS inventory_updated_at
        FROM inventories
        WHERE user_id = ?
        "#,
    )
    .bind(owner_id.to_string())
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(inventory_from_row).transpose()
}

async fn fetch_entry(
    conn: &mut SqliteConnection,
    owner_id: Uuid,
    entry_id: Uuid,
) -> Result<Option<InventoryEntryWithPiece>> {
    let sql = format!("{} WHERE e.id = ? AND e.owner_id = ?", ENTRY_WITH_PIECE_SELECT);
    let row = sqlx::query(&sql)
        .bind(entry_id.to_string())
        .bind(owner_id.to_string())
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(entry_with_piece_from_row).transpose()
}

/// Take one slot and insert the entry that occupies it
///
/// The slot is claimed with a conditional increment, so a full inventory
/// fails before anything is written.
pub async fn insert_entry(
    conn: &mut SqliteConnection,
    owner_id: Uuid,
    piece_id: Uuid,
    provenance: Provenance,
) -> Result<InventoryEntry> {
    let now = time::now();

    let claimed = sqlx::query(
        r#"
        UPDATE inventories
        SET current_usage = current_usage + 1, updated_at = ?
        WHERE user_id = ? AND current_usage < capacity
        "#,
    )
    .bind(now)
    .bind(owner_id.to_string())
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if claimed == 0 {
        return match fetch_inventory(conn, owner_id).await? {
            None => Err(Error::NotFound(format!("inventory for user {}", owner_id))),
            Some(inventory) => {
                debug!(
                    user_id = %owner_id,
                    capacity = inventory.capacity,
                    "Inventory full, entry rejected"
                );
                Err(Error::CapacityExceeded(format!(
                    "inventory is full ({}/{})",
                    inventory.current_usage, inventory.capacity
                )))
            }
        };
    }

    let id = uuid_utils::generate();
    let serial_number = sqlx::query(
        r#"
        INSERT INTO inventory_entries (id, owner_id, piece_id, provenance, is_locked, created_at)
        VALUES (?, ?, ?, ?, 0, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(owner_id.to_string())
    .bind(piece_id.to_string())
    .bind(provenance.as_str())
    .bind(now)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    Ok(InventoryEntry {
        id,
        owner_id,
        piece_id,
        provenance,
        is_locked: false,
        serial_number,
        created_at: now,
    })
}

/// Delete each entry and release the same number of slots
///
/// Every id must name an unlocked entry owned by `owner_id`; otherwise the
/// call fails `Conflict` and the caller's transaction must be rolled back.
pub async fn delete_entries(
    conn: &mut SqliteConnection,
    owner_id: Uuid,
    entry_ids: &[Uuid],
) -> Result<Vec<Uuid>> {
    let mut removed = Vec::with_capacity(entry_ids.len());

    for id in entry_ids {
        if removed.contains(id) {
            continue;
        }
        let deleted = sqlx::query(
            "DELETE FROM inventory_entries WHERE id = ? AND owner_id = ? AND is_locked = 0",
        )
        .bind(id.to_string())
        .bind(owner_id.to_string())
        .execute(&mut *conn)
        .await?
        .rows_affected();

        if deleted != 1 {
            debug!(user_id = %owner_id, entry_id = %id, "Entry not removable");
            return Err(Error::Conflict(format!(
                "entry {} not found, not owned by user, or locked",
                id
            )));
        }
        removed.push(*id);
    }

    let released = sqlx::query(
        r#"
        UPDATE inventories
        SET current_usage = current_usage - ?, updated_at = ?
        WHERE user_id = ? AND current_usage >= ?
        "#,
    )
    .bind(removed.len() as i64)
    .bind(time::now())
    .bind(owner_id.to_string())
    .bind(removed.len() as i64)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if released != 1 {
        error!(
            user_id = %owner_id,
            count = removed.len(),
            "Usage underflow while removing entries"
        );
        return Err(Error::Internal(format!(
            "inventory usage for user {} could not be decremented",
            owner_id
        )));
    }

    Ok(removed)
}

/// Check `current_usage == live entries <= capacity` inside the open transaction
pub async fn ensure_usage_consistent(conn: &mut SqliteConnection, owner_id: Uuid) -> Result<()> {
    let (capacity, usage, live): (i64, i64, i64) = sqlx::query_as(
        r#"
        SELECT i.capacity, i.current_usage,
               (SELECT COUNT(*) FROM inventory_entries e WHERE e.owner_id = i.user_id)
        FROM inventories i
        WHERE i.user_id = ?
        "#,
    )
    .bind(owner_id.to_string())
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| Error::NotFound(format!("inventory for user {}", owner_id)))?;

    if usage != live || usage > capacity {
        error!(
            user_id = %owner_id,
            capacity,
            usage,
            live,
            "Inventory ledger out of balance"
        );
        return Err(Error::Internal(format!(
            "inventory ledger out of balance for user {}: usage {}, entries {}, capacity {}",
            owner_id, usage, live, capacity
        )));
    }

    Ok(())
}

//! Row decoding for the fusion schema
//!
//! Joined queries alias piece columns with a prefix (`p1_name`, `p2_rarity`, ...)
//! so the same decoder serves every join.

use crate::db::models::{
    FusionRecord, Inventory, InventoryEntry, Piece, PieceSnapshot, Reward, RewardValue, User,
};
use crate::uuid_utils::parse_column;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::str::FromStr;
use uuid::Uuid;

fn uuid_at(row: &SqliteRow, column: &str) -> Result<Uuid> {
    let raw: String = row.try_get(column)?;
    parse_column(column, &raw)
}

fn symbol_at<T: FromStr<Err = Error>>(row: &SqliteRow, column: &str) -> Result<T> {
    let raw: String = row.try_get(column)?;
    raw.parse()
        .map_err(|e| Error::Internal(format!("bad value in column {}: {}", column, e)))
}

fn timestamp_at(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>> {
    Ok(row.try_get(column)?)
}

pub fn piece_from_row(row: &SqliteRow) -> Result<Piece> {
    let tags_json: String = row.try_get("tags")?;
    let tags = serde_json::from_str(&tags_json)
        .map_err(|e| Error::Internal(format!("bad tags json: {}", e)))?;

    Ok(Piece {
        id: uuid_at(row, "id")?,
        shape_family: row.try_get("shape_family")?,
        half: symbol_at(row, "half")?,
        rarity: symbol_at(row, "rarity")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        tags,
        is_active: row.try_get("is_active")?,
        created_at: timestamp_at(row, "created_at")?,
    })
}

/// Decode `{prefix}name`, `{prefix}shape_family`, `{prefix}half`, `{prefix}rarity`
pub fn snapshot_from_row(row: &SqliteRow, prefix: &str) -> Result<PieceSnapshot> {
    Ok(PieceSnapshot {
        name: row.try_get(format!("{prefix}name").as_str())?,
        shape_family: row.try_get(format!("{prefix}shape_family").as_str())?,
        half: symbol_at(row, &format!("{prefix}half"))?,
        rarity: symbol_at(row, &format!("{prefix}rarity"))?,
    })
}

pub fn user_from_row(row: &SqliteRow) -> Result<User> {
    Ok(User {
        id: uuid_at(row, "id")?,
        handle: row.try_get("handle")?,
        display_name: row.try_get("display_name")?,
        is_active: row.try_get("is_active")?,
        created_at: timestamp_at(row, "created_at")?,
        updated_at: timestamp_at(row, "updated_at")?,
    })
}

/// Expects inventory columns aliased `inventory_id`, `capacity`, `current_usage`,
/// `inventory_updated_at` and the owner in `user_id`
pub fn inventory_from_row(row: &SqliteRow) -> Result<Inventory> {
    Ok(Inventory {
        id: uuid_at(row, "inventory_id")?,
        user_id: uuid_at(row, "user_id")?,
        capacity: row.try_get("capacity")?,
        current_usage: row.try_get("current_usage")?,
        updated_at: timestamp_at(row, "inventory_updated_at")?,
    })
}

pub fn entry_from_row(row: &SqliteRow) -> Result<InventoryEntry> {
    Ok(InventoryEntry {
        id: uuid_at(row, "id")?,
        owner_id: uuid_at(row, "owner_id")?,
        piece_id: uuid_at(row, "piece_id")?,
        provenance: symbol_at(row, "provenance")?,
        is_locked: row.try_get("is_locked")?,
        serial_number: row.try_get("serial_number")?,
        created_at: timestamp_at(row, "created_at")?,
    })
}

pub fn fusion_from_row(row: &SqliteRow) -> Result<FusionRecord> {
    Ok(FusionRecord {
        id: uuid_at(row, "id")?,
        user_id: uuid_at(row, "user_id")?,
        input_entry_1_id: uuid_at(row, "input_entry_1_id")?,
        input_entry_2_id: uuid_at(row, "input_entry_2_id")?,
        input_piece_1_id: uuid_at(row, "input_piece_1_id")?,
        input_piece_2_id: uuid_at(row, "input_piece_2_id")?,
        shape_family: row.try_get("shape_family")?,
        is_success: row.try_get("is_success")?,
        score_value: row.try_get("score_value")?,
        created_at: timestamp_at(row, "created_at")?,
    })
}

pub fn reward_from_row(row: &SqliteRow) -> Result<Reward> {
    let value_json: String = row.try_get("reward_value")?;
    let reward_value: RewardValue = serde_json::from_str(&value_json)
        .map_err(|e| Error::Internal(format!("bad reward_value json: {}", e)))?;

    Ok(Reward {
        id: uuid_at(row, "id")?,
        fusion_id: uuid_at(row, "fusion_id")?,
        user_id: uuid_at(row, "user_id")?,
        reward_value,
        status: symbol_at(row, "status")?,
        claimed_at: row.try_get("claimed_at")?,
        created_at: timestamp_at(row, "created_at")?,
    })
}

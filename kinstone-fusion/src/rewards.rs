//! Reward issuer
//!
//! Rewards are created `pending` by a successful fusion and move strictly
//! forward: `pending -> claimed -> consumed`. Each transition is a conditional
//! update on the current status inside a write transaction, so two racing
//! claims cannot both succeed.

use crate::pagination::Page;
use crate::store::begin_write;
use kinstone_common::db::rows::reward_from_row;
use kinstone_common::db::{Reward, RewardStatus, RewardType, RewardValue, RewardWithFusion};
use kinstone_common::{time, uuid_utils, Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use std::collections::BTreeMap;
use tracing::{debug, info};
use uuid::Uuid;

const REWARD_WITH_FUSION_SELECT: &str = r#"
    SELECT r.id, r.fusion_id, r.user_id, r.reward_type, r.reward_value, r.status,
           r.claimed_at, r.created_at,
           f.shape_family, f.score_value, f.created_at AS fusion_created_at
    FROM rewards r
    JOIN fusions f ON f.id = r.fusion_id
"#;

/// Optional filters for [`RewardIssuer::list`]
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RewardFilter {
    pub status: Option<RewardStatus>,
    pub reward_type: Option<RewardType>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RewardStats {
    pub total: i64,
    pub by_status: BTreeMap<String, i64>,
    pub by_type: BTreeMap<String, i64>,
    pub total_coins: i64,
    pub total_points: i64,
}

#[derive(Clone)]
pub struct RewardIssuer {
    db: SqlitePool,
}

impl RewardIssuer {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Move one of the user's rewards from `pending` to `claimed`
    pub async fn claim(&self, reward_id: Uuid, user_id: Uuid) -> Result<Reward> {
        let mut tx = begin_write(&self.db).await?;

        let updated = sqlx::query(
            r#"
            UPDATE rewards
            SET status = 'claimed', claimed_at = ?
            WHERE id = ? AND user_id = ? AND status = 'pending'
            "#,
        )
        .bind(time::now())
        .bind(reward_id.to_string())
        .bind(user_id.to_string())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated != 1 {
            debug!(reward_id = %reward_id, user_id = %user_id, "Reward not claimable");
            return Err(Error::Conflict(format!(
                "reward {} not found, not owned by user, or not pending",
                reward_id
            )));
        }

        let reward = fetch_reward(&mut tx, reward_id).await?;
        tx.commit().await?;

        info!(reward_id = %reward_id, user_id = %user_id, "Reward claimed");
        Ok(reward)
    }

    /// Claim every pending reward of the user as one batch
    ///
    /// Returns the claimed rewards; an empty list when nothing was pending.
    pub async fn claim_all_pending(&self, user_id: Uuid) -> Result<Vec<Reward>> {
        let mut tx = begin_write(&self.db).await?;

        let pending: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT id FROM rewards
            WHERE user_id = ? AND status = 'pending'
            ORDER BY created_at, rowid
            "#,
        )
        .bind(user_id.to_string())
        .fetch_all(&mut *tx)
        .await?;

        if pending.is_empty() {
            return Ok(Vec::new());
        }

        let updated = sqlx::query(
            r#"
            UPDATE rewards
            SET status = 'claimed', claimed_at = ?
            WHERE user_id = ? AND status = 'pending'
            "#,
        )
        .bind(time::now())
        .bind(user_id.to_string())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated != pending.len() as u64 {
            return Err(Error::Conflict(
                "pending rewards changed while claiming".to_string(),
            ));
        }

        let mut claimed = Vec::with_capacity(pending.len());
        for id in &pending {
            let id = uuid_utils::parse_column("id", id)?;
            claimed.push(fetch_reward(&mut tx, id).await?);
        }

        tx.commit().await?;

        info!(user_id = %user_id, count = claimed.len(), "Claimed all pending rewards");
        Ok(claimed)
    }

    /// Move a reward from `claimed` to `consumed`
    pub async fn mark_consumed(&self, reward_id: Uuid) -> Result<Reward> {
        let mut tx = begin_write(&self.db).await?;

        let updated = sqlx::query(
            "UPDATE rewards SET status = 'consumed' WHERE id = ? AND status = 'claimed'",
        )
        .bind(reward_id.to_string())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated != 1 {
            debug!(reward_id = %reward_id, "Reward not consumable");
            return Err(Error::Conflict(format!(
                "reward {} not found or not claimed",
                reward_id
            )));
        }

        let reward = fetch_reward(&mut tx, reward_id).await?;
        tx.commit().await?;

        info!(reward_id = %reward_id, "Reward consumed");
        Ok(reward)
    }

    pub async fn get(&self, reward_id: Uuid, user_id: Uuid) -> Result<RewardWithFusion> {
        let sql = format!("{} WHERE r.id = ? AND r.user_id = ?", REWARD_WITH_FUSION_SELECT);
        let row = sqlx::query(&sql)
            .bind(reward_id.to_string())
            .bind(user_id.to_string())
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| Error::NotFound(format!("reward {} for user {}", reward_id, user_id)))?;

        reward_with_fusion_from_row(&row)
    }

    /// The user's rewards, newest first
    pub async fn list(
        &self,
        user_id: Uuid,
        filter: &RewardFilter,
        page: Page,
    ) -> Result<Vec<RewardWithFusion>> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(REWARD_WITH_FUSION_SELECT);
        query.push(" WHERE r.user_id = ").push_bind(user_id.to_string());
        if let Some(status) = filter.status {
            query.push(" AND r.status = ").push_bind(status.as_str());
        }
        if let Some(reward_type) = filter.reward_type {
            query.push(" AND r.reward_type = ").push_bind(reward_type.as_str());
        }
        query
            .push(" ORDER BY r.created_at DESC, r.rowid DESC LIMIT ")
            .push_bind(page.limit)
            .push(" OFFSET ")
            .push_bind(page.offset);

        let rows = query.build().fetch_all(&self.db).await?;
        rows.iter().map(reward_with_fusion_from_row).collect()
    }

    pub async fn stats(&self, user_id: Uuid) -> Result<RewardStats> {
        let by_status: Vec<(String, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM rewards WHERE user_id = ? GROUP BY status",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.db)
        .await?;

        let by_type: Vec<(String, i64)> = sqlx::query_as(
            "SELECT reward_type, COUNT(*) FROM rewards WHERE user_id = ? GROUP BY reward_type",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.db)
        .await?;

        let (total_coins, total_points): (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN reward_type = 'coins'
                    THEN json_extract(reward_value, '$.amount') END), 0),
                COALESCE(SUM(CASE WHEN reward_type = 'points'
                    THEN json_extract(reward_value, '$.amount') END), 0)
            FROM rewards
            WHERE user_id = ?
            "#,
        )
        .bind(user_id.to_string())
        .fetch_one(&self.db)
        .await?;

        let mut status_counts: BTreeMap<String, i64> = [
            RewardStatus::Pending,
            RewardStatus::Claimed,
            RewardStatus::Consumed,
        ]
        .iter()
        .map(|s| (s.as_str().to_string(), 0))
        .collect();
        status_counts.extend(by_status);

        Ok(RewardStats {
            total: status_counts.values().sum(),
            by_status: status_counts,
            by_type: by_type.into_iter().collect(),
            total_coins,
            total_points,
        })
    }
}

/// Insert a pending reward for `fusion_id` on the caller's transaction
pub async fn insert_reward(
    conn: &mut SqliteConnection,
    fusion_id: Uuid,
    user_id: Uuid,
    value: RewardValue,
) -> Result<Reward> {
    let id = uuid_utils::generate();
    let created_at = time::now();
    let payload = serde_json::to_string(&value)
        .map_err(|e| Error::Internal(format!("failed to encode reward value: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO rewards (id, fusion_id, user_id, reward_type, reward_value, status, created_at)
        VALUES (?, ?, ?, ?, ?, 'pending', ?)
        "#,
    )
    .bind(id.to_string())
    .bind(fusion_id.to_string())
    .bind(user_id.to_string())
    .bind(value.reward_type().as_str())
    .bind(payload)
    .bind(created_at)
    .execute(&mut *conn)
    .await?;

    debug!(reward_id = %id, fusion_id = %fusion_id, user_id = %user_id, "Reward created");

    Ok(Reward {
        id,
        fusion_id,
        user_id,
        reward_value: value,
        status: RewardStatus::Pending,
        claimed_at: None,
        created_at,
    })
}

async fn fetch_reward(conn: &mut SqliteConnection, reward_id: Uuid) -> Result<Reward> {
    let row = sqlx::query("SELECT * FROM rewards WHERE id = ?")
        .bind(reward_id.to_string())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| Error::NotFound(format!("reward {}", reward_id)))?;

    reward_from_row(&row)
}

fn reward_with_fusion_from_row(row: &SqliteRow) -> Result<RewardWithFusion> {
    Ok(RewardWithFusion {
        reward: reward_from_row(row)?,
        shape_family: row.try_get("shape_family")?,
        score_value: row.try_get("score_value")?,
        fusion_created_at: row.try_get("fusion_created_at")?,
    })
}

//! Read side of the fusion audit log

use crate::pagination::Page;
use kinstone_common::db::rows::{fusion_from_row, snapshot_from_row};
use kinstone_common::db::FusionWithPieces;
use kinstone_common::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

const FUSION_WITH_PIECES_SELECT: &str = r#"
    SELECT f.id, f.user_id, f.input_entry_1_id, f.input_entry_2_id,
           f.input_piece_1_id, f.input_piece_2_id, f.shape_family, f.is_success,
           f.score_value, f.created_at,
           p1.name AS p1_name, p1.shape_family AS p1_shape_family,
           p1.half AS p1_half, p1.rarity AS p1_rarity,
           p2.name AS p2_name, p2.shape_family AS p2_shape_family,
           p2.half AS p2_half, p2.rarity AS p2_rarity
    FROM fusions f
    JOIN pieces p1 ON p1.id = f.input_piece_1_id
    JOIN pieces p2 ON p2.id = f.input_piece_2_id
"#;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryFilter {
    #[serde(default)]
    pub success_only: bool,
    pub shape_family: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShapeBreakdown {
    pub shape_family: String,
    pub attempts: i64,
    pub successes: i64,
    pub total_score: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FusionStats {
    pub total_attempts: i64,
    pub successful: i64,
    pub failed: i64,
    pub total_score: i64,
    /// Mean score over all attempts; failures count as 0
    pub average_score: f64,
    pub highest_score: i64,
    pub distinct_shape_families: i64,
    /// Fraction of attempts that succeeded, 0.0 to 1.0
    pub success_rate: f64,
    pub by_shape: Vec<ShapeBreakdown>,
}

#[derive(Clone)]
pub struct FusionHistory {
    db: SqlitePool,
}

impl FusionHistory {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn get(&self, fusion_id: Uuid, user_id: Uuid) -> Result<FusionWithPieces> {
        let sql = format!("{} WHERE f.id = ? AND f.user_id = ?", FUSION_WITH_PIECES_SELECT);
        let row = sqlx::query(&sql)
            .bind(fusion_id.to_string())
            .bind(user_id.to_string())
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| {
                Error::NotFound(format!("fusion {} for user {}", fusion_id, user_id))
            })?;

        fusion_with_pieces_from_row(&row)
    }

    /// The user's fusion attempts, newest first
    pub async fn history(
        &self,
        user_id: Uuid,
        filter: &HistoryFilter,
        page: Page,
    ) -> Result<Vec<FusionWithPieces>> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(FUSION_WITH_PIECES_SELECT);
        query.push(" WHERE f.user_id = ").push_bind(user_id.to_string());
        if filter.success_only {
            query.push(" AND f.is_success = 1");
        }
        if let Some(shape_family) = &filter.shape_family {
            query.push(" AND f.shape_family = ").push_bind(shape_family.clone());
        }
        query
            .push(" ORDER BY f.created_at DESC, f.rowid DESC LIMIT ")
            .push_bind(page.limit)
            .push(" OFFSET ")
            .push_bind(page.offset);

        let rows = query.build().fetch_all(&self.db).await?;
        rows.iter().map(fusion_with_pieces_from_row).collect()
    }

    pub async fn stats(&self, user_id: Uuid) -> Result<FusionStats> {
        let (
            total_attempts,
            successful,
            total_score,
            average_score,
            highest_score,
            distinct_shape_families,
        ): (i64, i64, i64, f64, i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COALESCE(SUM(is_success), 0),
                   COALESCE(SUM(score_value), 0),
                   COALESCE(AVG(score_value), 0.0),
                   COALESCE(MAX(score_value), 0),
                   COUNT(DISTINCT shape_family)
            FROM fusions
            WHERE user_id = ?
            "#,
        )
        .bind(user_id.to_string())
        .fetch_one(&self.db)
        .await?;

        let by_shape: Vec<(String, i64, i64, i64)> = sqlx::query_as(
            r#"
            SELECT shape_family,
                   COUNT(*),
                   COALESCE(SUM(is_success), 0),
                   COALESCE(SUM(score_value), 0) AS total_score
            FROM fusions
            WHERE user_id = ?
            GROUP BY shape_family
            ORDER BY total_score DESC, shape_family
            "#,
        )
        .bind(user_id.to_string())
        .fetch_all(&self.db)
        .await?;

        let success_rate = if total_attempts > 0 {
            successful as f64 / total_attempts as f64
        } else {
            0.0
        };

        Ok(FusionStats {
            total_attempts,
            successful,
            failed: total_attempts - successful,
            total_score,
            average_score,
            highest_score,
            distinct_shape_families,
            success_rate,
            by_shape: by_shape
                .into_iter()
                .map(|(shape_family, attempts, successes, total_score)| ShapeBreakdown {
                    shape_family,
                    attempts,
                    successes,
                    total_score,
                })
                .collect(),
        })
    }
}

fn fusion_with_pieces_from_row(row: &SqliteRow) -> Result<FusionWithPieces> {
    Ok(FusionWithPieces {
        fusion: fusion_from_row(row)?,
        input_piece_1: snapshot_from_row(row, "p1_")?,
        input_piece_2: snapshot_from_row(row, "p2_")?,
    })
}

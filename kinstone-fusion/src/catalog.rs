//! Piece catalog
//!
//! Pieces are immutable definitions apart from their active flag. Inactive
//! pieces stay readable so historical entries and fusion records still
//! resolve, but no new entries can be created from them.

use crate::pagination::Page;
use kinstone_common::db::rows::piece_from_row;
use kinstone_common::db::{Half, Piece, Rarity};
use kinstone_common::{time, uuid_utils, Error, Result};
use serde::Deserialize;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::info;
use uuid::Uuid;

/// Fields for a new catalog piece
#[derive(Debug, Clone, Deserialize)]
pub struct NewPiece {
    pub shape_family: String,
    pub half: Half,
    #[serde(default)]
    pub rarity: Option<Rarity>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PieceFilter {
    pub rarity: Option<Rarity>,
    pub shape_family: Option<String>,
    /// Match pieces carrying at least one of these tags
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_active_only")]
    pub active_only: bool,
}

fn default_active_only() -> bool {
    true
}

impl Default for PieceFilter {
    fn default() -> Self {
        Self {
            rarity: None,
            shape_family: None,
            tags: Vec::new(),
            active_only: default_active_only(),
        }
    }
}

#[derive(Clone)]
pub struct Catalog {
    db: SqlitePool,
}

impl Catalog {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn create_piece(&self, new: NewPiece) -> Result<Piece> {
        let shape_family = new.shape_family.trim().to_string();
        let name = new.name.trim().to_string();
        if shape_family.is_empty() {
            return Err(Error::InvalidInput("shape_family must not be empty".to_string()));
        }
        if name.is_empty() {
            return Err(Error::InvalidInput("name must not be empty".to_string()));
        }

        let piece = Piece {
            id: uuid_utils::generate(),
            shape_family,
            half: new.half,
            rarity: new.rarity.unwrap_or(Rarity::Common),
            name,
            description: new.description,
            tags: new.tags,
            is_active: true,
            created_at: time::now(),
        };
        let tags = serde_json::to_string(&piece.tags)
            .map_err(|e| Error::Internal(format!("failed to encode tags: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO pieces (
                id, shape_family, half, rarity, name, description, tags, is_active, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?)
            "#,
        )
        .bind(piece.id.to_string())
        .bind(&piece.shape_family)
        .bind(piece.half.as_str())
        .bind(piece.rarity.as_str())
        .bind(&piece.name)
        .bind(&piece.description)
        .bind(tags)
        .bind(piece.created_at)
        .execute(&self.db)
        .await?;

        info!(
            piece_id = %piece.id,
            shape_family = %piece.shape_family,
            half = %piece.half,
            rarity = %piece.rarity,
            "Catalog piece created"
        );

        Ok(piece)
    }

    pub async fn get_piece(&self, piece_id: Uuid) -> Result<Piece> {
        let row = sqlx::query("SELECT * FROM pieces WHERE id = ?")
            .bind(piece_id.to_string())
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| Error::NotFound(format!("piece {}", piece_id)))?;

        piece_from_row(&row)
    }

    /// Pieces ordered by shape family, half, then rarity
    pub async fn list_pieces(&self, filter: &PieceFilter, page: Page) -> Result<Vec<Piece>> {
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT * FROM pieces WHERE 1 = 1");
        if filter.active_only {
            query.push(" AND is_active = 1");
        }
        if let Some(rarity) = filter.rarity {
            query.push(" AND rarity = ").push_bind(rarity.as_str());
        }
        if let Some(shape_family) = &filter.shape_family {
            query.push(" AND shape_family = ").push_bind(shape_family.clone());
        }
        if !filter.tags.is_empty() {
            query.push(" AND EXISTS (SELECT 1 FROM json_each(pieces.tags)");
            query.push(" WHERE json_each.value IN (");
            let mut tags = query.separated(", ");
            for tag in &filter.tags {
                tags.push_bind(tag.clone());
            }
            query.push("))");
        }
        query
            .push(" ORDER BY shape_family, half, rarity, name LIMIT ")
            .push_bind(page.limit)
            .push(" OFFSET ")
            .push_bind(page.offset);

        let rows = query.build().fetch_all(&self.db).await?;
        rows.iter().map(piece_from_row).collect()
    }

    /// Activate or retire a piece
    pub async fn set_piece_active(&self, piece_id: Uuid, active: bool) -> Result<Piece> {
        let updated = sqlx::query("UPDATE pieces SET is_active = ? WHERE id = ?")
            .bind(active)
            .bind(piece_id.to_string())
            .execute(&self.db)
            .await?
            .rows_affected();

        if updated == 0 {
            return Err(Error::NotFound(format!("piece {}", piece_id)));
        }

        info!(piece_id = %piece_id, active, "Catalog piece active flag changed");
        self.get_piece(piece_id).await
    }
}

//! Users and their inventories
//!
//! A user and its inventory are created together; there is no user without
//! an inventory.
//!
//! Users are never deleted. Deactivating one hides it from every read here,
//! while its inventory, fusion records and rewards stay in place. Handles
//! stay reserved after deactivation.

use crate::pagination::Page;
use crate::store::begin_write;
use kinstone_common::db::rows::{inventory_from_row, user_from_row};
use kinstone_common::db::UserWithInventory;
use kinstone_common::{time, uuid_utils, Error, Result};
use serde::Deserialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::info;
use uuid::Uuid;

const USER_WITH_INVENTORY_SELECT: &str = r#"
    SELECT u.*,
           i.id AS inventory_id, i.user_id, i.capacity, i.current_usage,
           i.updated_at AS inventory_updated_at
    FROM users u
    JOIN inventories i ON i.user_id = u.id
"#;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewUser {
    pub handle: Option<String>,
    pub display_name: Option<String>,
    /// Falls back to the configured default capacity
    pub inventory_capacity: Option<i64>,
}

/// Profile fields to change; absent fields are left alone
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserUpdate {
    pub handle: Option<String>,
    pub display_name: Option<String>,
}

#[derive(Clone)]
pub struct Users {
    db: SqlitePool,
    default_capacity: i64,
}

impl Users {
    pub fn new(db: SqlitePool, default_capacity: i64) -> Self {
        Self {
            db,
            default_capacity,
        }
    }

    /// Create a user together with an empty inventory
    pub async fn create_user(&self, new: NewUser) -> Result<UserWithInventory> {
        let capacity = new.inventory_capacity.unwrap_or(self.default_capacity);
        if capacity < 1 {
            return Err(Error::InvalidInput(format!(
                "inventory capacity must be at least 1, got {}",
                capacity
            )));
        }
        let handle = normalize_handle(new.handle);

        let mut tx = begin_write(&self.db).await?;

        if let Some(handle) = &handle {
            ensure_handle_available(&mut tx, handle, None).await?;
        }

        let user_id = uuid_utils::generate();
        let now = time::now();

        sqlx::query(
            r#"
            INSERT INTO users (id, handle, display_name, is_active, created_at, updated_at)
            VALUES (?, ?, ?, 1, ?, ?)
            "#,
        )
        .bind(user_id.to_string())
        .bind(&handle)
        .bind(&new.display_name)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO inventories (id, user_id, capacity, current_usage, updated_at)
            VALUES (?, ?, ?, 0, ?)
            "#,
        )
        .bind(uuid_utils::generate().to_string())
        .bind(user_id.to_string())
        .bind(capacity)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let created = fetch_user(&mut tx, user_id).await?;
        tx.commit().await?;

        info!(user_id = %user_id, capacity, "User created");
        Ok(created)
    }

    pub async fn get_user(&self, user_id: Uuid) -> Result<UserWithInventory> {
        let mut conn = self.db.acquire().await?;
        fetch_user(&mut conn, user_id).await
    }

    /// Active users, newest first
    pub async fn list_users(&self, page: Page) -> Result<Vec<UserWithInventory>> {
        let sql = format!(
            "{} WHERE u.is_active = 1 ORDER BY u.created_at DESC, u.rowid DESC LIMIT ? OFFSET ?",
            USER_WITH_INVENTORY_SELECT
        );
        let rows = sqlx::query(&sql)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&self.db)
            .await?;

        rows.iter().map(user_with_inventory_from_row).collect()
    }

    /// Change handle and/or display name of an active user
    ///
    /// Fails `InvalidInput` when nothing is given or the handle belongs to
    /// another user, `NotFound` when the user is unknown or deactivated.
    pub async fn update_user(
        &self,
        user_id: Uuid,
        update: UserUpdate,
    ) -> Result<UserWithInventory> {
        if update.handle.is_none() && update.display_name.is_none() {
            return Err(Error::InvalidInput("no fields to update".to_string()));
        }
        let handle = normalize_handle(update.handle);

        let mut tx = begin_write(&self.db).await?;

        let current = fetch_user(&mut tx, user_id).await?;
        if let Some(handle) = &handle {
            ensure_handle_available(&mut tx, handle, Some(user_id)).await?;
        }

        sqlx::query(
            r#"
            UPDATE users
            SET handle = COALESCE(?, handle),
                display_name = COALESCE(?, display_name),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&handle)
        .bind(&update.display_name)
        .bind(time::now())
        .bind(user_id.to_string())
        .execute(&mut *tx)
        .await?;

        let updated = fetch_user(&mut tx, user_id).await?;
        tx.commit().await?;

        info!(
            user_id = %user_id,
            old_handle = ?current.user.handle,
            new_handle = ?updated.user.handle,
            "User updated"
        );
        Ok(updated)
    }

    /// Soft delete: the user disappears from reads, its records stay
    pub async fn deactivate_user(&self, user_id: Uuid) -> Result<()> {
        let updated = sqlx::query(
            "UPDATE users SET is_active = 0, updated_at = ? WHERE id = ? AND is_active = 1",
        )
        .bind(time::now())
        .bind(user_id.to_string())
        .execute(&self.db)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(Error::NotFound(format!("user {}", user_id)));
        }

        info!(user_id = %user_id, "User deactivated");
        Ok(())
    }
}

fn normalize_handle(handle: Option<String>) -> Option<String> {
    handle
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
}

/// Handles are unique across all users, deactivated ones included
async fn ensure_handle_available(
    conn: &mut SqliteConnection,
    handle: &str,
    exclude: Option<Uuid>,
) -> Result<()> {
    let holder: Option<String> = sqlx::query_scalar("SELECT id FROM users WHERE handle = ?")
        .bind(handle)
        .fetch_optional(&mut *conn)
        .await?;

    match holder {
        Some(id) if exclude.map(|e| e.to_string()).as_deref() != Some(id.as_str()) => Err(
            Error::InvalidInput(format!("handle '{}' is already taken", handle)),
        ),
        _ => Ok(()),
    }
}

async fn fetch_user(conn: &mut SqliteConnection, user_id: Uuid) -> Result<UserWithInventory> {
    let sql = format!("{} WHERE u.id = ? AND u.is_active = 1", USER_WITH_INVENTORY_SELECT);
    let row = sqlx::query(&sql)
        .bind(user_id.to_string())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| Error::NotFound(format!("user {}", user_id)))?;

    user_with_inventory_from_row(&row)
}

fn user_with_inventory_from_row(row: &SqliteRow) -> Result<UserWithInventory> {
    Ok(UserWithInventory {
        user: user_from_row(row)?,
        inventory: inventory_from_row(row)?,
    })
}

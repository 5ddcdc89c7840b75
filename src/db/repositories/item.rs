//! Menu item repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

use super::{delete_by_id, fetch_page, slug_exists};
use crate::models::Item;
use crate::object::{ListQuery, Loader, Object, PagedResult, SlugFinder, Writer};

const COLUMNS: &str = "id, name, slug, location, position, hidden, content_id, parent_id, created_at, updated_at";

pub struct SqlxItemRepository {
    pool: SqlitePool,
}

impl SqlxItemRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: SqlitePool) -> Arc<Self> {
        Arc::new(Self::new(pool))
    }

    /// Visible items of a menu, in display order
    pub async fn list_by_location(&self, location: &str) -> Result<Vec<Item>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM items WHERE location = ? AND hidden = 0 ORDER BY position ASC, id ASC",
            COLUMNS
        ))
        .bind(location)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list menu items")?;
        Ok(rows.iter().map(row_to_item).collect())
    }
}

#[async_trait]
impl Loader<Item> for SqlxItemRepository {
    async fn load(&self, id: i64) -> Result<Option<Item>> {
        let row = sqlx::query(&format!("SELECT {} FROM items WHERE id = ?", COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get menu item")?;
        Ok(row.map(|r| row_to_item(&r)))
    }

    async fn query(&self, query: &ListQuery) -> Result<PagedResult<Item>> {
        fetch_page(&self.pool, "items", COLUMNS, Item::SORTABLE_COLUMNS, query, |row| Ok(row_to_item(row))).await
    }
}

#[async_trait]
impl Writer<Item> for SqlxItemRepository {
    async fn save(&self, item: &mut Item) -> Result<()> {
        let now = Utc::now();

        if item.is_new() {
            let result = sqlx::query(
                r#"
                INSERT INTO items (name, slug, location, position, hidden, content_id, parent_id, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&item.name)
            .bind(&item.slug)
            .bind(&item.location)
            .bind(item.position)
            .bind(item.hidden)
            .bind(item.content_id)
            .bind(item.parent_id)
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await
            .context("Failed to create menu item")?;

            item.id = result.last_insert_rowid();
            item.created_at = now;
        } else {
            sqlx::query(
                r#"
                UPDATE items
                SET name = ?, slug = ?, location = ?, position = ?, hidden = ?, content_id = ?, parent_id = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&item.name)
            .bind(&item.slug)
            .bind(&item.location)
            .bind(item.position)
            .bind(item.hidden)
            .bind(item.content_id)
            .bind(item.parent_id)
            .bind(now)
            .bind(item.id)
            .execute(&self.pool)
            .await
            .context("Failed to update menu item")?;
        }

        item.updated_at = now;
        Ok(())
    }

    async fn remove(&self, item: &Item) -> Result<()> {
        delete_by_id(&self.pool, "items", item.id).await
    }
}

#[async_trait]
impl SlugFinder for SqlxItemRepository {
    async fn slug_exists(&self, slug: &str, exclude_id: i64) -> Result<bool> {
        slug_exists(&self.pool, "items", slug, exclude_id).await
    }
}

fn row_to_item(row: &SqliteRow) -> Item {
    Item {
        id: row.get("id"),
        name: row.get("name"),
        slug: row.get("slug"),
        location: row.get("location"),
        position: row.get("position"),
        hidden: row.get("hidden"),
        content_id: row.get("content_id"),
        parent_id: row.get("parent_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

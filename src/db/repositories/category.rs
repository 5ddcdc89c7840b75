//! Category repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

use super::{delete_by_id, fetch_page, slug_exists};
use crate::models::Category;
use crate::object::{ListQuery, Loader, Object, PagedResult, SlugFinder, Writer};

const COLUMNS: &str = "id, name, slug, location, hidden, parent_id, created_at, updated_at";

pub struct SqlxCategoryRepository {
    pool: SqlitePool,
}

impl SqlxCategoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: SqlitePool) -> Arc<Self> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl Loader<Category> for SqlxCategoryRepository {
    async fn load(&self, id: i64) -> Result<Option<Category>> {
        let row = sqlx::query(&format!("SELECT {} FROM categories WHERE id = ?", COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get category by ID")?;
        Ok(row.map(|r| row_to_category(&r)))
    }

    async fn query(&self, query: &ListQuery) -> Result<PagedResult<Category>> {
        fetch_page(&self.pool, "categories", COLUMNS, Category::SORTABLE_COLUMNS, query, |row| {
            Ok(row_to_category(row))
        })
        .await
    }
}

#[async_trait]
impl Writer<Category> for SqlxCategoryRepository {
    async fn save(&self, category: &mut Category) -> Result<()> {
        let now = Utc::now();

        if category.is_new() {
            let result = sqlx::query(
                r#"
                INSERT INTO categories (name, slug, location, hidden, parent_id, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&category.name)
            .bind(&category.slug)
            .bind(&category.location)
            .bind(category.hidden)
            .bind(category.parent_id)
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await
            .context("Failed to create category")?;

            category.id = result.last_insert_rowid();
            category.created_at = now;
        } else {
            sqlx::query(
                r#"
                UPDATE categories
                SET name = ?, slug = ?, location = ?, hidden = ?, parent_id = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&category.name)
            .bind(&category.slug)
            .bind(&category.location)
            .bind(category.hidden)
            .bind(category.parent_id)
            .bind(now)
            .bind(category.id)
            .execute(&self.pool)
            .await
            .context("Failed to update category")?;
        }

        category.updated_at = now;
        Ok(())
    }

    async fn remove(&self, category: &Category) -> Result<()> {
        delete_by_id(&self.pool, "categories", category.id).await
    }
}

#[async_trait]
impl SlugFinder for SqlxCategoryRepository {
    async fn slug_exists(&self, slug: &str, exclude_id: i64) -> Result<bool> {
        slug_exists(&self.pool, "categories", slug, exclude_id).await
    }
}

fn row_to_category(row: &SqliteRow) -> Category {
    Category {
        id: row.get("id"),
        name: row.get("name"),
        slug: row.get("slug"),
        location: row.get("location"),
        hidden: row.get("hidden"),
        parent_id: row.get("parent_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

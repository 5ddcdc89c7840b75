//! Content type repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

use super::{delete_by_id, fetch_page};
use crate::models::ContentType;
use crate::object::{ListQuery, Loader, Object, PagedResult, Writer};

const COLUMNS: &str = "id, name, template, blocks, created_at, updated_at";

pub struct SqlxContentTypeRepository {
    pool: SqlitePool,
}

impl SqlxContentTypeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: SqlitePool) -> Arc<Self> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl Loader<ContentType> for SqlxContentTypeRepository {
    async fn load(&self, id: i64) -> Result<Option<ContentType>> {
        let row = sqlx::query(&format!("SELECT {} FROM types WHERE id = ?", COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get content type")?;
        row.map(|r| row_to_type(&r)).transpose()
    }

    async fn query(&self, query: &ListQuery) -> Result<PagedResult<ContentType>> {
        fetch_page(&self.pool, "types", COLUMNS, ContentType::SORTABLE_COLUMNS, query, row_to_type).await
    }
}

#[async_trait]
impl Writer<ContentType> for SqlxContentTypeRepository {
    async fn save(&self, content_type: &mut ContentType) -> Result<()> {
        let now = Utc::now();
        let blocks = serde_json::to_string(&content_type.blocks).context("Failed to encode blocks")?;

        if content_type.is_new() {
            let result = sqlx::query(
                "INSERT INTO types (name, template, blocks, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&content_type.name)
            .bind(&content_type.template)
            .bind(&blocks)
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await
            .context("Failed to create content type")?;

            content_type.id = result.last_insert_rowid();
            content_type.created_at = now;
        } else {
            sqlx::query("UPDATE types SET name = ?, template = ?, blocks = ?, updated_at = ? WHERE id = ?")
                .bind(&content_type.name)
                .bind(&content_type.template)
                .bind(&blocks)
                .bind(now)
                .bind(content_type.id)
                .execute(&self.pool)
                .await
                .context("Failed to update content type")?;
        }

        content_type.updated_at = now;
        Ok(())
    }

    async fn remove(&self, content_type: &ContentType) -> Result<()> {
        delete_by_id(&self.pool, "types", content_type.id).await
    }
}

fn row_to_type(row: &SqliteRow) -> Result<ContentType> {
    let blocks: String = row.get("blocks");
    Ok(ContentType {
        id: row.get("id"),
        name: row.get("name"),
        template: row.get("template"),
        blocks: serde_json::from_str(&blocks).context("Invalid content type blocks")?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    #[tokio::test]
    async fn test_save_load_and_remove() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.expect("Failed to run migrations");
        let repo = SqlxContentTypeRepository::new(pool);

        let mut page = ContentType {
            name: "Page".to_string(),
            blocks: vec!["body".to_string(), "aside".to_string()],
            ..ContentType::default()
        };
        repo.save(&mut page).await.unwrap();

        let loaded = repo.load(page.id).await.unwrap().unwrap();
        assert_eq!(loaded.template, "content.html");
        assert_eq!(loaded.blocks, vec!["body".to_string(), "aside".to_string()]);

        page.template = "page.html".to_string();
        repo.save(&mut page).await.unwrap();
        assert_eq!(repo.load(page.id).await.unwrap().unwrap().template, "page.html");

        repo.remove(&page).await.unwrap();
        assert!(repo.load(page.id).await.unwrap().is_none());
    }
}

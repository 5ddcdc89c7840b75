//! Media repository
//!
//! Only the metadata is stored here; file contents live in the media
//! directory under `local_path`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

use super::{delete_by_id, fetch_page};
use crate::models::Media;
use crate::object::{ListQuery, Loader, Object, PagedResult, Writer};

const COLUMNS: &str = "id, name, mime_type, length, alternative, local_path, created_at, updated_at";

pub struct SqlxMediaRepository {
    pool: SqlitePool,
}

impl SqlxMediaRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: SqlitePool) -> Arc<Self> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl Loader<Media> for SqlxMediaRepository {
    async fn load(&self, id: i64) -> Result<Option<Media>> {
        let row = sqlx::query(&format!("SELECT {} FROM media WHERE id = ?", COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get media")?;
        Ok(row.map(|r| row_to_media(&r)))
    }

    async fn query(&self, query: &ListQuery) -> Result<PagedResult<Media>> {
        fetch_page(&self.pool, "media", COLUMNS, Media::SORTABLE_COLUMNS, query, |row| Ok(row_to_media(row))).await
    }
}

#[async_trait]
impl Writer<Media> for SqlxMediaRepository {
    async fn save(&self, media: &mut Media) -> Result<()> {
        let now = Utc::now();

        if media.is_new() {
            let result = sqlx::query(
                r#"
                INSERT INTO media (name, mime_type, length, alternative, local_path, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&media.name)
            .bind(&media.mime_type)
            .bind(media.length)
            .bind(&media.alternative)
            .bind(&media.local_path)
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await
            .context("Failed to create media")?;

            media.id = result.last_insert_rowid();
            media.created_at = now;
        } else {
            sqlx::query(
                r#"
                UPDATE media
                SET name = ?, mime_type = ?, length = ?, alternative = ?, local_path = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&media.name)
            .bind(&media.mime_type)
            .bind(media.length)
            .bind(&media.alternative)
            .bind(&media.local_path)
            .bind(now)
            .bind(media.id)
            .execute(&self.pool)
            .await
            .context("Failed to update media")?;
        }

        media.updated_at = now;
        Ok(())
    }

    async fn remove(&self, media: &Media) -> Result<()> {
        delete_by_id(&self.pool, "media", media.id).await
    }
}

fn row_to_media(row: &SqliteRow) -> Media {
    Media {
        id: row.get("id"),
        name: row.get("name"),
        mime_type: row.get("mime_type"),
        length: row.get("length"),
        alternative: row.get("alternative"),
        local_path: row.get("local_path"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use crate::object::{Direction, ListParams, Order};

    #[tokio::test]
    async fn test_save_and_query() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.expect("Failed to run migrations");
        let repo = SqlxMediaRepository::new(pool);

        let mut logo = Media {
            name: "logo.png".to_string(),
            mime_type: "image/png".to_string(),
            length: 2048,
            local_path: "abc.png".to_string(),
            ..Media::default()
        };
        repo.save(&mut logo).await.unwrap();

        let loaded = repo.load(logo.id).await.unwrap().unwrap();
        assert_eq!(loaded.local_path, "abc.png");
        assert_eq!(loaded.length, 2048);

        let page = repo
            .query(&ListQuery {
                params: ListParams::default(),
                order: Order::new("name", Direction::Desc),
            })
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].name, "logo.png");
    }
}

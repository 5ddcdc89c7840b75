//! Content repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

use super::{delete_by_id, fetch_page, slug_exists};
use crate::models::Content;
use crate::object::{ListQuery, Loader, Object, PagedResult, SlugFinder, Writer};

const COLUMNS: &str =
    "id, type_id, title, subtitle, slug, description, parts, tags, published_at, created_at, updated_at";

/// Content lookups beyond plain CRUD
#[async_trait]
pub trait ContentRepository: Loader<Content> + Writer<Content> + SlugFinder {
    /// Find a content by slug, only if it is already published
    async fn find_published_by_slug(&self, slug: &str) -> Result<Option<Content>>;
}

pub struct SqlxContentRepository {
    pool: SqlitePool,
}

impl SqlxContentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: SqlitePool) -> Arc<Self> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl Loader<Content> for SqlxContentRepository {
    async fn load(&self, id: i64) -> Result<Option<Content>> {
        let row = sqlx::query(&format!("SELECT {} FROM contents WHERE id = ?", COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get content")?;
        row.map(|r| row_to_content(&r)).transpose()
    }

    async fn query(&self, query: &ListQuery) -> Result<PagedResult<Content>> {
        fetch_page(
            &self.pool,
            "contents",
            COLUMNS,
            Content::SORTABLE_COLUMNS,
            query,
            row_to_content,
        )
        .await
    }
}

#[async_trait]
impl Writer<Content> for SqlxContentRepository {
    async fn save(&self, content: &mut Content) -> Result<()> {
        let now = Utc::now();
        let parts = serde_json::to_string(&content.parts).context("Failed to encode content parts")?;

        if content.is_new() {
            let result = sqlx::query(
                "INSERT INTO contents (type_id, title, subtitle, slug, description, parts, tags, published_at, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(content.type_id)
            .bind(&content.title)
            .bind(&content.subtitle)
            .bind(&content.slug)
            .bind(&content.description)
            .bind(&parts)
            .bind(content.tags_column())
            .bind(content.published_at)
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await
            .context("Failed to create content")?;

            content.id = result.last_insert_rowid();
            content.created_at = now;
        } else {
            sqlx::query(
                "UPDATE contents SET type_id = ?, title = ?, subtitle = ?, slug = ?, description = ?, parts = ?, tags = ?, published_at = ?, updated_at = ? \
                 WHERE id = ?",
            )
            .bind(content.type_id)
            .bind(&content.title)
            .bind(&content.subtitle)
            .bind(&content.slug)
            .bind(&content.description)
            .bind(&parts)
            .bind(content.tags_column())
            .bind(content.published_at)
            .bind(now)
            .bind(content.id)
            .execute(&self.pool)
            .await
            .context("Failed to update content")?;
        }

        content.updated_at = now;
        Ok(())
    }

    async fn remove(&self, content: &Content) -> Result<()> {
        delete_by_id(&self.pool, "contents", content.id).await
    }
}

#[async_trait]
impl SlugFinder for SqlxContentRepository {
    async fn slug_exists(&self, slug: &str, exclude_id: i64) -> Result<bool> {
        slug_exists(&self.pool, "contents", slug, exclude_id).await
    }
}

#[async_trait]
impl ContentRepository for SqlxContentRepository {
    async fn find_published_by_slug(&self, slug: &str) -> Result<Option<Content>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM contents WHERE slug = ? AND published_at IS NOT NULL AND published_at <= ?",
            COLUMNS
        ))
        .bind(slug)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get published content")?;
        row.map(|r| row_to_content(&r)).transpose()
    }
}

fn row_to_content(row: &SqliteRow) -> Result<Content> {
    let parts: String = row.get("parts");
    let tags: String = row.get("tags");
    Ok(Content {
        id: row.get("id"),
        type_id: row.get("type_id"),
        title: row.get("title"),
        subtitle: row.get("subtitle"),
        slug: row.get("slug"),
        description: row.get("description"),
        parts: serde_json::from_str(&parts).context("Invalid content parts")?,
        tags: Content::parse_tags(&tags),
        published_at: row.get("published_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use crate::object::{Direction, ListParams, Order};
    use chrono::Duration;

    async fn setup() -> SqlxContentRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.expect("Failed to run migrations");
        SqlxContentRepository::new(pool)
    }

    fn content(title: &str, slug: &str) -> Content {
        let mut content = Content::new(title);
        content.slug = slug.to_string();
        content
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let repo = setup().await;
        let mut about = content("About", "about");
        about.parts.insert("body".to_string(), "<p>Hi</p>".to_string());
        about.tags = vec!["company".to_string()];

        repo.save(&mut about).await.unwrap();
        assert!(about.id > 0);

        let loaded = repo.load(about.id).await.unwrap().unwrap();
        assert_eq!(loaded.title, "About");
        assert_eq!(loaded.parts["body"], "<p>Hi</p>");
        assert_eq!(loaded.tags, vec!["company".to_string()]);
        assert!(loaded.published_at.is_none());
    }

    #[tokio::test]
    async fn test_update_keeps_id() {
        let repo = setup().await;
        let mut about = content("About", "about");
        repo.save(&mut about).await.unwrap();
        let id = about.id;

        about.title = "About us".to_string();
        repo.save(&mut about).await.unwrap();
        assert_eq!(about.id, id);
        assert_eq!(repo.load(id).await.unwrap().unwrap().title, "About us");
    }

    #[tokio::test]
    async fn test_load_missing_returns_none() {
        let repo = setup().await;
        assert!(repo.load(42).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove() {
        let repo = setup().await;
        let mut about = content("About", "about");
        repo.save(&mut about).await.unwrap();
        repo.remove(&about).await.unwrap();
        assert!(repo.load(about.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_published_by_slug() {
        let repo = setup().await;
        let mut draft = content("Draft", "draft");
        repo.save(&mut draft).await.unwrap();

        let mut live = content("Live", "live");
        live.published_at = Some(Utc::now() - Duration::hours(1));
        repo.save(&mut live).await.unwrap();

        let mut scheduled = content("Soon", "soon");
        scheduled.published_at = Some(Utc::now() + Duration::days(2));
        repo.save(&mut scheduled).await.unwrap();

        assert!(repo.find_published_by_slug("draft").await.unwrap().is_none());
        assert!(repo.find_published_by_slug("soon").await.unwrap().is_none());
        assert_eq!(repo.find_published_by_slug("live").await.unwrap().unwrap().id, live.id);
    }

    #[tokio::test]
    async fn test_slug_exists_excludes_self() {
        let repo = setup().await;
        let mut about = content("About", "about");
        repo.save(&mut about).await.unwrap();

        assert!(repo.slug_exists("about", 0).await.unwrap());
        assert!(!repo.slug_exists("about", about.id).await.unwrap());
        assert!(!repo.slug_exists("contact", 0).await.unwrap());
    }

    #[tokio::test]
    async fn test_query_pages_and_orders() {
        let repo = setup().await;
        for (title, slug) in [("Charlie", "c"), ("Alpha", "a"), ("Bravo", "b")] {
            repo.save(&mut content(title, slug)).await.unwrap();
        }

        let query = ListQuery {
            params: ListParams::new(1, 2),
            order: Order::new("title", Direction::Asc),
        };
        let page = repo.query(&query).await.unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].title, "Alpha");
        assert_eq!(page.items[1].title, "Bravo");

        let query = ListQuery {
            params: ListParams::new(2, 2),
            order: Order::new("title", Direction::Asc),
        };
        let page = repo.query(&query).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].title, "Charlie");
    }

    #[tokio::test]
    async fn test_query_ignores_unknown_order_column() {
        let repo = setup().await;
        repo.save(&mut content("Alpha", "a")).await.unwrap();

        let query = ListQuery {
            params: ListParams::default(),
            order: Order::new("title; DROP TABLE contents", Direction::Desc),
        };
        let page = repo.query(&query).await.unwrap();
        assert_eq!(page.total, 1);
    }
}

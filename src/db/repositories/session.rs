//! Session repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

use crate::models::{Session, SessionStage};

/// Session repository trait
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, session: &Session) -> Result<Session>;

    /// Get session by ID (token)
    async fn get_by_id(&self, id: &str) -> Result<Option<Session>>;

    /// Move a session to another authentication stage
    async fn update_stage(&self, id: &str, stage: SessionStage) -> Result<()>;

    async fn delete(&self, id: &str) -> Result<()>;

    /// Delete all sessions for a user
    async fn delete_by_user(&self, user_id: i64) -> Result<()>;

    /// Delete expired sessions, returning how many were removed
    async fn delete_expired(&self) -> Result<i64>;
}

pub struct SqlxSessionRepository {
    pool: SqlitePool,
}

impl SqlxSessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: SqlitePool) -> Arc<dyn SessionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn create(&self, session: &Session) -> Result<Session> {
        sqlx::query(
            r#"
            INSERT INTO sessions (id, user_id, stage, expires_at, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&session.id)
        .bind(session.user_id)
        .bind(session.stage.to_string())
        .bind(session.expires_at)
        .bind(session.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to create session")?;

        Ok(session.clone())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Session>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, stage, expires_at, created_at
            FROM sessions
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get session by ID")?;

        match row {
            Some(row) => Ok(Some(row_to_session(&row)?)),
            None => Ok(None),
        }
    }

    async fn update_stage(&self, id: &str, stage: SessionStage) -> Result<()> {
        sqlx::query("UPDATE sessions SET stage = ? WHERE id = ?")
            .bind(stage.to_string())
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update session stage")?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    async fn delete_by_user(&self, user_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .context("Failed to delete sessions by user")?;
        Ok(())
    }

    async fn delete_expired(&self) -> Result<i64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at < ?")
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .context("Failed to delete expired sessions")?;
        Ok(result.rows_affected() as i64)
    }
}

fn row_to_session(row: &SqliteRow) -> Result<Session> {
    let stage: String = row.get("stage");
    Ok(Session {
        id: row.get("id"),
        user_id: row.get("user_id"),
        stage: stage.parse()?,
        expires_at: row.get("expires_at"),
        created_at: row.get("created_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use chrono::Duration;

    async fn setup() -> SqlxSessionRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.expect("Failed to run migrations");
        sqlx::query("INSERT INTO users (id, email) VALUES (1, 'a@example.com'), (2, 'b@example.com')")
            .execute(&pool)
            .await
            .expect("Failed to insert users");
        SqlxSessionRepository::new(pool)
    }

    fn session(id: &str, user_id: i64, expires_in: Duration) -> Session {
        let now = Utc::now();
        Session {
            id: id.to_string(),
            user_id,
            stage: SessionStage::Full,
            expires_at: now + expires_in,
            created_at: now,
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let repo = setup().await;
        repo.create(&session("abc", 1, Duration::hours(1))).await.unwrap();

        let found = repo.get_by_id("abc").await.unwrap().unwrap();
        assert_eq!(found.user_id, 1);
        assert_eq!(found.stage, SessionStage::Full);
        assert!(repo.get_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_stage() {
        let repo = setup().await;
        let mut pending = session("abc", 1, Duration::hours(1));
        pending.stage = SessionStage::TotpPending;
        repo.create(&pending).await.unwrap();

        repo.update_stage("abc", SessionStage::Full).await.unwrap();
        assert_eq!(repo.get_by_id("abc").await.unwrap().unwrap().stage, SessionStage::Full);
    }

    #[tokio::test]
    async fn test_delete_by_user() {
        let repo = setup().await;
        repo.create(&session("a1", 1, Duration::hours(1))).await.unwrap();
        repo.create(&session("a2", 1, Duration::hours(1))).await.unwrap();
        repo.create(&session("b1", 2, Duration::hours(1))).await.unwrap();

        repo.delete_by_user(1).await.unwrap();
        assert!(repo.get_by_id("a1").await.unwrap().is_none());
        assert!(repo.get_by_id("a2").await.unwrap().is_none());
        assert!(repo.get_by_id("b1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_expired() {
        let repo = setup().await;
        repo.create(&session("old", 1, Duration::hours(-1))).await.unwrap();
        repo.create(&session("new", 1, Duration::hours(1))).await.unwrap();

        assert_eq!(repo.delete_expired().await.unwrap(), 1);
        assert!(repo.get_by_id("old").await.unwrap().is_none());
        assert!(repo.get_by_id("new").await.unwrap().is_some());
    }
}

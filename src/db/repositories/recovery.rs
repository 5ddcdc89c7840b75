//! Recovery access repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

use crate::models::RecoveryAccess;

/// A user has at most one pending recovery access
#[async_trait]
pub trait RecoveryAccessRepository: Send + Sync {
    async fn find_by_token_hash(&self, token_hash: &str) -> Result<Option<RecoveryAccess>>;

    /// Store an access, replacing any previous one of the same user
    async fn save(&self, access: &RecoveryAccess) -> Result<()>;

    async fn delete_by_user(&self, user_id: i64) -> Result<()>;
}

pub struct SqlxRecoveryAccessRepository {
    pool: SqlitePool,
}

impl SqlxRecoveryAccessRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: SqlitePool) -> Arc<dyn RecoveryAccessRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl RecoveryAccessRepository for SqlxRecoveryAccessRepository {
    async fn find_by_token_hash(&self, token_hash: &str) -> Result<Option<RecoveryAccess>> {
        let row = sqlx::query(
            "SELECT user_id, token_hash, expires_at, created_at FROM recovery_accesses WHERE token_hash = ?",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get recovery access")?;

        Ok(row.map(|r| row_to_access(&r)))
    }

    async fn save(&self, access: &RecoveryAccess) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO recovery_accesses (user_id, token_hash, expires_at, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                token_hash = excluded.token_hash,
                expires_at = excluded.expires_at,
                created_at = excluded.created_at
            "#,
        )
        .bind(access.user_id)
        .bind(&access.token_hash)
        .bind(access.expires_at)
        .bind(access.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to save recovery access")?;
        Ok(())
    }

    async fn delete_by_user(&self, user_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM recovery_accesses WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .context("Failed to delete recovery access")?;
        Ok(())
    }
}

fn row_to_access(row: &SqliteRow) -> RecoveryAccess {
    RecoveryAccess {
        user_id: row.get("user_id"),
        token_hash: row.get("token_hash"),
        expires_at: row.get("expires_at"),
        created_at: row.get("created_at"),
    }
}

//! TOTP configuration repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

use crate::models::TotpAuth;

#[async_trait]
pub trait TotpRepository: Send + Sync {
    /// Get the TOTP configuration of a user, enabled or not
    async fn get(&self, user_id: i64) -> Result<Option<TotpAuth>>;

    /// Insert or replace the configuration of `auth.user_id`
    async fn save(&self, auth: &TotpAuth) -> Result<()>;

    async fn delete(&self, user_id: i64) -> Result<()>;
}

pub struct SqlxTotpRepository {
    pool: SqlitePool,
}

impl SqlxTotpRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: SqlitePool) -> Arc<dyn TotpRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl TotpRepository for SqlxTotpRepository {
    async fn get(&self, user_id: i64) -> Result<Option<TotpAuth>> {
        let row = sqlx::query(
            r#"
            SELECT user_id, provider, secret, algorithm, period, digits, enabled, created_at
            FROM totp_auths
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get TOTP configuration")?;

        row.map(|r| row_to_totp(&r)).transpose()
    }

    async fn save(&self, auth: &TotpAuth) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO totp_auths (user_id, provider, secret, algorithm, period, digits, enabled, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                provider = excluded.provider,
                secret = excluded.secret,
                algorithm = excluded.algorithm,
                period = excluded.period,
                digits = excluded.digits,
                enabled = excluded.enabled
            "#,
        )
        .bind(auth.user_id)
        .bind(&auth.provider)
        .bind(&auth.secret)
        .bind(auth.algorithm.to_string())
        .bind(auth.period as i64)
        .bind(auth.digits as i64)
        .bind(auth.enabled)
        .bind(auth.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to save TOTP configuration")?;
        Ok(())
    }

    async fn delete(&self, user_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM totp_auths WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .context("Failed to delete TOTP configuration")?;
        Ok(())
    }
}

fn row_to_totp(row: &SqliteRow) -> Result<TotpAuth> {
    let algorithm: String = row.get("algorithm");
    Ok(TotpAuth {
        user_id: row.get("user_id"),
        provider: row.get("provider"),
        secret: row.get("secret"),
        algorithm: algorithm.parse()?,
        period: row.get::<i64, _>("period") as u64,
        digits: row.get::<i64, _>("digits") as u32,
        enabled: row.get("enabled"),
        created_at: row.get("created_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use crate::models::TotpAlgorithm;
    use chrono::Utc;

    async fn setup() -> SqlxTotpRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.expect("Failed to run migrations");
        sqlx::query("INSERT INTO users (id, email) VALUES (1, 'a@example.com')")
            .execute(&pool)
            .await
            .expect("Failed to insert user");
        SqlxTotpRepository::new(pool)
    }

    fn auth(enabled: bool) -> TotpAuth {
        TotpAuth {
            user_id: 1,
            provider: "generic".to_string(),
            secret: "JBSWY3DPEHPK3PXP".to_string(),
            algorithm: TotpAlgorithm::Sha256,
            period: 30,
            digits: 6,
            enabled,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_save_and_get() {
        let repo = setup().await;
        assert!(repo.get(1).await.unwrap().is_none());

        repo.save(&auth(false)).await.unwrap();
        let stored = repo.get(1).await.unwrap().unwrap();
        assert_eq!(stored.secret, "JBSWY3DPEHPK3PXP");
        assert_eq!(stored.algorithm, TotpAlgorithm::Sha256);
        assert_eq!(stored.digits, 6);
        assert!(!stored.enabled);
    }

    #[tokio::test]
    async fn test_save_replaces_existing() {
        let repo = setup().await;
        repo.save(&auth(false)).await.unwrap();
        repo.save(&auth(true)).await.unwrap();
        assert!(repo.get(1).await.unwrap().unwrap().enabled);
    }

    #[tokio::test]
    async fn test_delete() {
        let repo = setup().await;
        repo.save(&auth(true)).await.unwrap();
        repo.delete(1).await.unwrap();
        assert!(repo.get(1).await.unwrap().is_none());
    }
}

//! User repository
//!
//! Users are CRUD objects ([`Loader`]/[`Writer`]). Password hashes are kept in
//! the `stored_passwords` table: when a saved user carries a `new_password`,
//! it is hashed and stored in the same transaction.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

use super::{delete_by_id, fetch_page};
use crate::models::{StoredPassword, User};
use crate::object::{ListQuery, Loader, Object, PagedResult, Writer};
use crate::services::password::hash_password;

const COLUMNS: &str = "id, email, first_name, last_name, roles, active, created_at, updated_at";

/// User lookups beyond plain CRUD
#[async_trait]
pub trait UserRepository: Loader<User> + Writer<User> {
    /// Get user by email, case-insensitively
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn get_password(&self, user_id: i64) -> Result<Option<StoredPassword>>;

    /// Replace the password of a user with an already computed hash
    async fn set_password(&self, user_id: i64, hash: &str) -> Result<()>;

    /// Count total users
    async fn count(&self) -> Result<i64>;
}

pub struct SqlxUserRepository {
    pool: SqlitePool,
}

impl SqlxUserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: SqlitePool) -> Arc<Self> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl Loader<User> for SqlxUserRepository {
    async fn load(&self, id: i64) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = ?", COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get user by ID")?;
        row.map(|r| row_to_user(&r)).transpose()
    }

    async fn query(&self, query: &ListQuery) -> Result<PagedResult<User>> {
        fetch_page(&self.pool, "users", COLUMNS, User::SORTABLE_COLUMNS, query, row_to_user).await
    }
}

#[async_trait]
impl Writer<User> for SqlxUserRepository {
    async fn save(&self, user: &mut User) -> Result<()> {
        let now = Utc::now();
        let password_hash = match &user.new_password {
            Some(password) => Some(hash_password(password)?),
            None => None,
        };

        let mut tx = self.pool.begin().await?;

        if user.is_new() {
            let result = sqlx::query(
                r#"
                INSERT INTO users (email, first_name, last_name, roles, active, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&user.email)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(user.roles_column())
            .bind(user.active)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await
            .context("Failed to create user")?;

            user.id = result.last_insert_rowid();
            user.created_at = now;
        } else {
            sqlx::query(
                r#"
                UPDATE users
                SET email = ?, first_name = ?, last_name = ?, roles = ?, active = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&user.email)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(user.roles_column())
            .bind(user.active)
            .bind(now)
            .bind(user.id)
            .execute(&mut *tx)
            .await
            .context("Failed to update user")?;
        }

        if let Some(hash) = password_hash {
            upsert_password(&mut tx, user.id, &hash).await?;
        }

        tx.commit().await?;

        user.updated_at = now;
        user.new_password = None;
        Ok(())
    }

    async fn remove(&self, user: &User) -> Result<()> {
        delete_by_id(&self.pool, "users", user.id).await
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM users WHERE email = ? COLLATE NOCASE",
            COLUMNS
        ))
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get user by email")?;
        row.map(|r| row_to_user(&r)).transpose()
    }

    async fn get_password(&self, user_id: i64) -> Result<Option<StoredPassword>> {
        let row = sqlx::query("SELECT user_id, hash, updated_at FROM stored_passwords WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get stored password")?;

        Ok(row.map(|row| StoredPassword {
            user_id: row.get("user_id"),
            hash: row.get("hash"),
            updated_at: row.get("updated_at"),
        }))
    }

    async fn set_password(&self, user_id: i64, hash: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        upsert_password(&mut tx, user_id, hash).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM users")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count users")?;
        Ok(row.get("count"))
    }
}

async fn upsert_password(tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>, user_id: i64, hash: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO stored_passwords (user_id, hash, updated_at) VALUES (?, ?, ?)
        ON CONFLICT(user_id) DO UPDATE SET hash = excluded.hash, updated_at = excluded.updated_at
        "#,
    )
    .bind(user_id)
    .bind(hash)
    .bind(Utc::now())
    .execute(&mut **tx)
    .await
    .context("Failed to store password")?;
    Ok(())
}

fn row_to_user(row: &SqliteRow) -> Result<User> {
    let roles: String = row.get("roles");
    Ok(User {
        id: row.get("id"),
        email: row.get("email"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        roles: User::parse_roles(&roles),
        active: row.get("active"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        new_password: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use crate::models::UserRole;
    use crate::services::password::verify_password;

    async fn setup() -> SqlxUserRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.expect("Failed to run migrations");
        SqlxUserRepository::new(pool)
    }

    #[tokio::test]
    async fn test_save_new_user() {
        let repo = setup().await;
        let mut user = User::new("jane@example.com", "Jane", "Doe").with_role(UserRole::Admin);

        repo.save(&mut user).await.unwrap();
        assert!(user.id > 0);

        let loaded = repo.load(user.id).await.unwrap().unwrap();
        assert_eq!(loaded.email, "jane@example.com");
        assert!(loaded.is_admin());
        assert!(repo.get_password(user.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_hashes_new_password() {
        let repo = setup().await;
        let mut user = User::new("jane@example.com", "Jane", "Doe");
        user.new_password = Some("correct horse".to_string());

        repo.save(&mut user).await.unwrap();
        assert!(user.new_password.is_none());

        let stored = repo.get_password(user.id).await.unwrap().unwrap();
        assert!(stored.hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse", &stored.hash).unwrap());
    }

    #[tokio::test]
    async fn test_set_password_replaces_hash() {
        let repo = setup().await;
        let mut user = User::new("jane@example.com", "", "");
        user.new_password = Some("first".to_string());
        repo.save(&mut user).await.unwrap();

        repo.set_password(user.id, &hash_password("second").unwrap()).await.unwrap();
        let stored = repo.get_password(user.id).await.unwrap().unwrap();
        assert!(verify_password("second", &stored.hash).unwrap());
        assert!(!verify_password("first", &stored.hash).unwrap());
    }

    #[tokio::test]
    async fn test_find_by_email_is_case_insensitive() {
        let repo = setup().await;
        let mut user = User::new("Jane@Example.com", "", "");
        repo.save(&mut user).await.unwrap();

        let found = repo.find_by_email(" jane@example.com ").await.unwrap();
        assert_eq!(found.map(|u| u.id), Some(user.id));
        assert!(repo.find_by_email("john@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unique_email_constraint() {
        let repo = setup().await;
        repo.save(&mut User::new("jane@example.com", "", "")).await.unwrap();
        assert!(repo.save(&mut User::new("jane@example.com", "", "")).await.is_err());
    }

    #[tokio::test]
    async fn test_remove_and_count() {
        let repo = setup().await;
        let mut jane = User::new("jane@example.com", "", "");
        jane.new_password = Some("pw".to_string());
        repo.save(&mut jane).await.unwrap();
        repo.save(&mut User::new("john@example.com", "", "")).await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 2);

        repo.remove(&jane).await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 1);
        assert!(repo.get_password(jane.id).await.unwrap().is_none());
    }
}

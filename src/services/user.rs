//! User service
//!
//! Authentication and session management:
//! - Password login, with a `totp_pending` session for accounts protected
//!   by a second factor
//! - Session validation (expired sessions are removed on sight)
//! - Password changes and first-user bootstrap
//! - One-time recovery tokens (only their SHA-256 digest is stored)

use anyhow::Context;
use argon2::password_hash::rand_core::{OsRng, RngCore};
use chrono::{Duration, Utc};
use data_encoding::HEXLOWER;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::{Session, SessionStage, User, UserRole};
use crate::recipe::StepError;
use crate::services::password::{hash_password, verify_password, MIN_PASSWORD_LENGTH};

/// Default session expiration time in days
pub const DEFAULT_SESSION_EXPIRATION_DAYS: i64 = 7;

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Authentication failed (invalid credentials)
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("User already exists: {0}")]
    UserExists(String),

    #[error("Session expired")]
    SessionExpired,

    #[error("Session not found")]
    SessionNotFound,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<UserServiceError> for StepError {
    fn from(error: UserServiceError) -> Self {
        match error {
            UserServiceError::AuthenticationError(_)
            | UserServiceError::SessionExpired
            | UserServiceError::SessionNotFound => StepError::unauthorized(error.to_string()),
            UserServiceError::ValidationError(message) => StepError::bad_request(message),
            UserServiceError::UserExists(_) => StepError::bad_request(error.to_string()),
            UserServiceError::InternalError(e) => StepError::Internal(e),
        }
    }
}

/// User attached to a request by the session middleware
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user: User,
    pub session: Session,
}

impl AuthenticatedUser {
    pub fn is_fully_authenticated(&self) -> bool {
        self.session.stage == SessionStage::Full
    }
}

/// User service for authentication and sessions
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    session_expiration_days: i64,
}

impl UserService {
    pub fn new(user_repo: Arc<dyn UserRepository>, session_repo: Arc<dyn SessionRepository>) -> Self {
        Self::with_session_expiration(user_repo, session_repo, DEFAULT_SESSION_EXPIRATION_DAYS)
    }

    /// Create a new user service with custom session expiration
    pub fn with_session_expiration(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        session_expiration_days: i64,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            session_expiration_days,
        }
    }

    /// Register a new user
    ///
    /// The first user of the website becomes an administrator.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<User, UserServiceError> {
        let email = email.trim();
        validate_email(email)?;
        validate_password(password)?;

        if self.user_repo.find_by_email(email).await?.is_some() {
            return Err(UserServiceError::UserExists(email.to_string()));
        }

        let mut user = User::new(email, first_name.trim(), last_name.trim());
        if self.user_repo.count().await? == 0 {
            user = user.with_role(UserRole::Admin);
        }
        user.new_password = Some(password.to_string());
        self.user_repo.save(&mut user).await?;

        tracing::info!("Registered user {} ({})", user.id, user.email);
        Ok(user)
    }

    /// Check credentials
    ///
    /// Unknown addresses, inactive accounts and wrong passwords are reported
    /// with the same message.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<User, UserServiceError> {
        let invalid = || UserServiceError::AuthenticationError("Invalid email or password".to_string());

        let user = self.user_repo.find_by_email(email).await?.ok_or_else(invalid)?;
        if !user.active {
            tracing::debug!("Login attempt on inactive user {}", user.id);
            return Err(invalid());
        }

        let stored = self.user_repo.get_password(user.id).await?.ok_or_else(invalid)?;
        if !verify_password(password, &stored.hash).context("Failed to verify password")? {
            return Err(invalid());
        }

        Ok(user)
    }

    /// Open a session for `user_id` at the given stage
    pub async fn open_session(&self, user_id: i64, stage: SessionStage) -> Result<Session, UserServiceError> {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4().to_string(),
            user_id,
            stage,
            expires_at: now + Duration::days(self.session_expiration_days),
            created_at: now,
        };

        Ok(self.session_repo.create(&session).await?)
    }

    /// Resolve a session token into its user
    pub async fn validate_session(&self, token: &str) -> Result<AuthenticatedUser, UserServiceError> {
        let session = self
            .session_repo
            .get_by_id(token)
            .await?
            .ok_or(UserServiceError::SessionNotFound)?;

        if session.is_expired() {
            self.session_repo.delete(&session.id).await?;
            return Err(UserServiceError::SessionExpired);
        }

        let user = match self.user_repo.load(session.user_id).await? {
            Some(user) if user.active => user,
            _ => {
                self.session_repo.delete(&session.id).await?;
                return Err(UserServiceError::SessionNotFound);
            }
        };

        Ok(AuthenticatedUser { user, session })
    }

    /// Mark a session as fully authenticated
    pub async fn promote_session(&self, session: &Session) -> Result<Session, UserServiceError> {
        self.session_repo.update_stage(&session.id, SessionStage::Full).await?;
        Ok(Session {
            stage: SessionStage::Full,
            ..session.clone()
        })
    }

    pub async fn close_session(&self, token: &str) -> Result<(), UserServiceError> {
        self.session_repo.delete(token).await?;
        Ok(())
    }

    /// Close every session of a user
    pub async fn close_user_sessions(&self, user_id: i64) -> Result<(), UserServiceError> {
        self.session_repo.delete_by_user(user_id).await?;
        Ok(())
    }

    /// Delete expired sessions, returning how many were removed
    pub async fn cleanup_expired_sessions(&self) -> Result<i64, UserServiceError> {
        let removed = self.session_repo.delete_expired().await?;
        if removed > 0 {
            tracing::info!("Removed {} expired sessions", removed);
        }
        Ok(removed)
    }

    /// Replace the password of a user
    pub async fn change_password(&self, user_id: i64, password: &str) -> Result<(), UserServiceError> {
        validate_password(password)?;
        let hash = hash_password(password)?;
        self.user_repo.set_password(user_id, &hash).await?;
        Ok(())
    }
}

fn validate_email(email: &str) -> Result<(), UserServiceError> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(UserServiceError::ValidationError(format!("Invalid email address: {}", email)))
    }
}

fn validate_password(password: &str) -> Result<(), UserServiceError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(UserServiceError::ValidationError(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

/// New random recovery token, sent to the user
pub fn generate_recovery_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    HEXLOWER.encode(&bytes)
}

/// Digest stored in place of a recovery token
pub fn hash_recovery_token(token: &str) -> String {
    HEXLOWER.encode(&Sha256::digest(token.as_bytes()))
}

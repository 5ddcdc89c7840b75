//! Recovery access: a one-time link to get back into an account

use async_trait::async_trait;
use axum::http::{header, StatusCode};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use super::form::reject_form;
use crate::db::repositories::{RecoveryAccessRepository, UserRepository};
use crate::forms::{FormState, PasswordForm, RecoveryForm};
use crate::http::{clear_session_cookie, session_cookie, Client, ServerRequest};
use crate::models::{RecoveryAccess, Session, SessionStage, User};
use crate::object::Loader;
use crate::recipe::{keys, Flow, Step, StepError, Workplan};
use crate::services::email::RecoveryNotifier;
use crate::services::{generate_recovery_token, hash_recovery_token, UserService, UserServiceError};

/// User asking for a recovery access, absent when the address is unknown
pub const RECOVERY_USER: &str = "recovery_user";

/// Clear token, only ever sent to the user
pub const RECOVERY_TOKEN: &str = "recovery_token";

/// Password form reached with a recovery session
pub const PASSWORD_ROUTE: &str = "/user/password";

/// Look up the active user owning the submitted address
pub struct FindUserByEmail {
    users: Arc<dyn UserRepository>,
}

impl FindUserByEmail {
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl Step for FindUserByEmail {
    async fn cook(&self, workplan: &mut Workplan) -> Result<Flow, StepError> {
        let email = workplan.require::<FormState<RecoveryForm>>(keys::FORM)?.form.email.trim().to_string();
        workplan.add_view_parameter("email", &email)?;

        match self.users.find_by_email(&email).await? {
            Some(user) if user.active => {
                workplan.insert(RECOVERY_USER, user);
            }
            _ => info!("Recovery asked for unknown address"),
        }
        Ok(Flow::Continue)
    }
}

/// Create the access of the user, replacing any previous one
pub struct PrepareRecoveryAccess {
    repo: Arc<dyn RecoveryAccessRepository>,
    ttl: Duration,
}

impl PrepareRecoveryAccess {
    pub fn new(repo: Arc<dyn RecoveryAccessRepository>, ttl_minutes: i64) -> Self {
        Self {
            repo,
            ttl: Duration::minutes(ttl_minutes),
        }
    }
}

#[async_trait]
impl Step for PrepareRecoveryAccess {
    async fn cook(&self, workplan: &mut Workplan) -> Result<Flow, StepError> {
        let user_id = workplan.require::<User>(RECOVERY_USER)?.id;
        let token = generate_recovery_token();
        let now = Utc::now();

        self.repo
            .save(&RecoveryAccess {
                user_id,
                token_hash: hash_recovery_token(&token),
                expires_at: now + self.ttl,
                created_at: now,
            })
            .await?;
        info!("Recovery access prepared for user {}", user_id);

        workplan.insert(RECOVERY_TOKEN, token);
        Ok(Flow::Continue)
    }
}

/// Send the recovery link to the user
///
/// Delivery failures are logged only; the answer must not tell whether the
/// address exists.
pub struct NotifyUserAboutRecoveryAccess {
    notifier: Arc<dyn RecoveryNotifier>,
    base_url: String,
}

impl NotifyUserAboutRecoveryAccess {
    pub fn new(notifier: Arc<dyn RecoveryNotifier>, base_url: impl Into<String>) -> Self {
        Self {
            notifier,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl Step for NotifyUserAboutRecoveryAccess {
    async fn cook(&self, workplan: &mut Workplan) -> Result<Flow, StepError> {
        let user = workplan.require::<User>(RECOVERY_USER)?;
        let token = workplan.require::<String>(RECOVERY_TOKEN)?;
        let link = format!(
            "{}/recovery/access?token={}",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(token)
        );

        if let Err(e) = self.notifier.notify(user, &link).await {
            warn!("Failed to send recovery link to user {}: {:#}", user.id, e);
        }
        Ok(Flow::Continue)
    }
}

/// Resolve the `token` query parameter into its access and user
pub struct LoadRecoveryAccess {
    repo: Arc<dyn RecoveryAccessRepository>,
    users: Arc<dyn Loader<User>>,
}

impl LoadRecoveryAccess {
    pub fn new(repo: Arc<dyn RecoveryAccessRepository>, users: Arc<dyn Loader<User>>) -> Self {
        Self { repo, users }
    }
}

#[async_trait]
impl Step for LoadRecoveryAccess {
    async fn cook(&self, workplan: &mut Workplan) -> Result<Flow, StepError> {
        let invalid = || StepError::not_found("This recovery link is invalid or expired");

        let token = workplan
            .require::<ServerRequest>(keys::REQUEST)?
            .query_param("token")
            .filter(|token| !token.is_empty())
            .ok_or_else(invalid)?;

        let access = self
            .repo
            .find_by_token_hash(&hash_recovery_token(token))
            .await?
            .ok_or_else(invalid)?;
        if access.is_expired() {
            self.repo.delete_by_user(access.user_id).await?;
            return Err(invalid());
        }

        let user = self
            .users
            .load(access.user_id)
            .await?
            .filter(|user| user.active)
            .ok_or_else(invalid)?;

        workplan.insert(RECOVERY_USER, user);
        Ok(Flow::Continue)
    }
}

/// Open a `recovery` session for the user of the access
///
/// That session only reaches the password form.
pub struct OpenRecoverySession {
    users: Arc<UserService>,
    session_days: i64,
}

impl OpenRecoverySession {
    pub fn new(users: Arc<UserService>, session_days: i64) -> Self {
        Self { users, session_days }
    }
}

#[async_trait]
impl Step for OpenRecoverySession {
    async fn cook(&self, workplan: &mut Workplan) -> Result<Flow, StepError> {
        let user = workplan.require::<User>(RECOVERY_USER)?.clone();
        let session = self.users.open_session(user.id, SessionStage::Recovery).await?;
        info!("Recovery session opened for user {}", user.id);

        workplan
            .require_mut::<Client>(keys::CLIENT)?
            .add_header(header::SET_COOKIE, &session_cookie(&session.id, self.session_days * 24 * 3600))?;
        workplan.insert(keys::ROUTE, PASSWORD_ROUTE.to_string());
        workplan.insert(keys::USER, user);
        workplan.insert(keys::SESSION, session);
        Ok(Flow::Continue)
    }
}

/// Replace the password of the current user
///
/// Coming from a recovery session, every session of the user is closed and
/// the user has to log in again.
pub struct UpdatePassword {
    users: Arc<UserService>,
}

impl UpdatePassword {
    pub fn new(users: Arc<UserService>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl Step for UpdatePassword {
    async fn cook(&self, workplan: &mut Workplan) -> Result<Flow, StepError> {
        let user_id = workplan.require::<User>(keys::USER)?.id;
        let password = workplan.require::<FormState<PasswordForm>>(keys::FORM)?.form.password.clone();

        match self.users.change_password(user_id, &password).await {
            Ok(()) => info!("Password changed for user {}", user_id),
            Err(UserServiceError::ValidationError(message)) => {
                return reject_form::<PasswordForm>(workplan, "password", &message, StatusCode::UNPROCESSABLE_ENTITY);
            }
            Err(e) => return Err(e.into()),
        }

        let recovering = workplan
            .get::<Session>(keys::SESSION)
            .map_or(false, |session| session.stage == SessionStage::Recovery);
        if recovering {
            self.users.close_user_sessions(user_id).await?;
            workplan.remove(keys::SESSION);
            workplan
                .require_mut::<Client>(keys::CLIENT)?
                .add_header(header::SET_COOKIE, &clear_session_cookie())?;
            workplan.insert(keys::ROUTE, "/login".to_string());
        }

        workplan.add_view_parameter("saved", true)?;
        Ok(Flow::Continue)
    }
}

/// Drop the pending access of the current user
pub struct RemoveRecoveryAccess {
    repo: Arc<dyn RecoveryAccessRepository>,
}

impl RemoveRecoveryAccess {
    pub fn new(repo: Arc<dyn RecoveryAccessRepository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl Step for RemoveRecoveryAccess {
    async fn cook(&self, workplan: &mut Workplan) -> Result<Flow, StepError> {
        let user_id = workplan.require::<User>(keys::USER)?.id;
        self.repo.delete_by_user(user_id).await?;
        Ok(Flow::Continue)
    }
}

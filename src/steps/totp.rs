//! Second factor steps: enrollment, confirmation and removal

use async_trait::async_trait;
use axum::http::StatusCode;
use std::sync::Arc;
use tracing::{info, warn};

use super::auth::{safe_redirect, DEFAULT_LOGIN_ROUTE, TOO_MANY_ATTEMPTS};
use super::form::reject_form;
use crate::db::repositories::TotpRepository;
use crate::forms::{FormState, TotpCodeForm};
use crate::http::ServerRequest;
use crate::models::{Session, TotpAuth, User};
use crate::recipe::{keys, Flow, Step, StepError, Workplan};
use crate::services::{LoginRateLimiter, TotpService, UserService};

/// [`TotpAuth`] of the current user
pub const TOTP: &str = "totp";

const WRONG_CODE: &str = "The code is not valid";

/// Check the submitted code against `auth`, sending the form back when wrong
fn check_code(service: &TotpService, workplan: &mut Workplan, auth: &TotpAuth) -> Result<Option<Flow>, StepError> {
    let code = workplan.require::<FormState<TotpCodeForm>>(keys::FORM)?.form.code();
    if service.verify(auth, &code)? {
        return Ok(None);
    }
    info!("Wrong TOTP code for user {}", auth.user_id);
    reject_form::<TotpCodeForm>(workplan, "code", WRONG_CODE, StatusCode::UNPROCESSABLE_ENTITY).map(Some)
}

/// Expose whether the current user has a second factor
pub struct LoadTotpStatus {
    repo: Arc<dyn TotpRepository>,
}

impl LoadTotpStatus {
    pub fn new(repo: Arc<dyn TotpRepository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl Step for LoadTotpStatus {
    async fn cook(&self, workplan: &mut Workplan) -> Result<Flow, StepError> {
        let user_id = workplan.require::<User>(keys::USER)?.id;
        let auth = self.repo.get(user_id).await?;

        workplan.add_view_parameter("totp_enabled", auth.as_ref().map_or(false, |auth| auth.enabled))?;
        workplan.add_view_parameter("totp_provider", auth.as_ref().map(|auth| auth.provider.as_str()))?;
        Ok(Flow::Continue)
    }
}

/// Prepare a secret for the current user to enroll
///
/// A pending secret is reused so that reloading the page keeps the QR code
/// already scanned. Users with an enabled second factor are refused.
pub struct EnableTotp {
    repo: Arc<dyn TotpRepository>,
    service: TotpService,
}

impl EnableTotp {
    pub fn new(repo: Arc<dyn TotpRepository>, service: TotpService) -> Self {
        Self { repo, service }
    }
}

#[async_trait]
impl Step for EnableTotp {
    async fn cook(&self, workplan: &mut Workplan) -> Result<Flow, StepError> {
        let user = workplan.require::<User>(keys::USER)?;

        let auth = match self.repo.get(user.id).await? {
            Some(auth) if auth.enabled => {
                return Err(StepError::bad_request("Two-factor authentication is already enabled"));
            }
            Some(auth) => auth,
            None => {
                let auth = self.service.generate(user.id);
                self.repo.save(&auth).await?;
                auth
            }
        };

        let url = self.service.provisioning_url(&auth, &user.email)?;
        let qr_code = self.service.qr_code(&auth, &user.email)?;

        workplan.add_view_parameter("secret", &auth.secret)?;
        workplan.add_view_parameter("provisioning_url", url)?;
        workplan.add_view_parameter("qr_code", qr_code)?;
        workplan.insert(TOTP, auth);
        Ok(Flow::Continue)
    }
}

/// Enable the pending secret once the user proved they can produce codes
pub struct ValidateTotp {
    repo: Arc<dyn TotpRepository>,
    service: TotpService,
}

impl ValidateTotp {
    pub fn new(repo: Arc<dyn TotpRepository>, service: TotpService) -> Self {
        Self { repo, service }
    }
}

#[async_trait]
impl Step for ValidateTotp {
    async fn cook(&self, workplan: &mut Workplan) -> Result<Flow, StepError> {
        let auth = workplan.require::<TotpAuth>(TOTP)?.clone();
        if let Some(flow) = check_code(&self.service, workplan, &auth)? {
            return Ok(flow);
        }

        let auth = TotpAuth { enabled: true, ..auth };
        self.repo.save(&auth).await?;
        info!("Enabled TOTP for user {}", auth.user_id);

        workplan.insert(TOTP, auth);
        Ok(Flow::Continue)
    }
}

/// Check a code against the enabled second factor of the current user
///
/// Failed codes count against the user in the [`LoginRateLimiter`]; once
/// locked, even a right code is refused until the window passes.
pub struct ConfirmTotp {
    repo: Arc<dyn TotpRepository>,
    service: TotpService,
    limiter: Arc<LoginRateLimiter>,
}

impl ConfirmTotp {
    pub fn new(repo: Arc<dyn TotpRepository>, service: TotpService, limiter: Arc<LoginRateLimiter>) -> Self {
        Self { repo, service, limiter }
    }
}

#[async_trait]
impl Step for ConfirmTotp {
    async fn cook(&self, workplan: &mut Workplan) -> Result<Flow, StepError> {
        let user_id = workplan.require::<User>(keys::USER)?.id;
        let auth = self
            .repo
            .get(user_id)
            .await?
            .filter(|auth| auth.enabled)
            .ok_or_else(|| StepError::bad_request("Two-factor authentication is not enabled"))?;

        let key = LoginRateLimiter::totp_key(user_id);
        if self.limiter.is_limited(&key).await {
            warn!("TOTP checks of user {} locked after failed attempts", user_id);
            return reject_form::<TotpCodeForm>(workplan, "code", TOO_MANY_ATTEMPTS, StatusCode::TOO_MANY_REQUESTS);
        }

        if let Some(flow) = check_code(&self.service, workplan, &auth)? {
            self.limiter.record_failure(&key).await;
            return Ok(flow);
        }
        self.limiter.clear(&key).await;

        workplan.insert(TOTP, auth);
        Ok(Flow::Continue)
    }
}

/// Turn a `totp_pending` session into a full one
///
/// The next route is the `redirect` query parameter when it is local.
pub struct PromoteSession {
    users: Arc<UserService>,
}

impl PromoteSession {
    pub fn new(users: Arc<UserService>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl Step for PromoteSession {
    async fn cook(&self, workplan: &mut Workplan) -> Result<Flow, StepError> {
        let session = workplan.require::<Session>(keys::SESSION)?;
        let session = self.users.promote_session(session).await?;
        info!("Session of user {} promoted", session.user_id);

        let route = workplan
            .get::<ServerRequest>(keys::REQUEST)
            .and_then(safe_redirect)
            .or_else(|| workplan.get::<String>(keys::ROUTE).cloned())
            .unwrap_or_else(|| DEFAULT_LOGIN_ROUTE.to_string());

        workplan.insert(keys::SESSION, session);
        workplan.insert(keys::ROUTE, route);
        Ok(Flow::Continue)
    }
}

/// Remove the second factor of the current user
///
/// Cooked after [`ConfirmTotp`], so a valid code is needed to disable it.
pub struct DisableTotp {
    repo: Arc<dyn TotpRepository>,
}

impl DisableTotp {
    pub fn new(repo: Arc<dyn TotpRepository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl Step for DisableTotp {
    async fn cook(&self, workplan: &mut Workplan) -> Result<Flow, StepError> {
        let user_id = workplan.require::<User>(keys::USER)?.id;
        self.repo.delete(user_id).await?;
        workplan.remove(TOTP);
        info!("Disabled TOTP for user {}", user_id);
        Ok(Flow::Continue)
    }
}

//! Login and logout steps

use async_trait::async_trait;
use axum::http::{header, StatusCode};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use super::form::reject_form;
use crate::db::repositories::TotpRepository;
use crate::forms::{FormState, LoginForm, GLOBAL_ERRORS};
use crate::http::{clear_session_cookie, session_cookie, Answer, Client, ServerRequest};
use crate::models::{Session, SessionStage};
use crate::recipe::{keys, Flow, Step, StepError, Workplan};
use crate::services::{LoginRateLimiter, UserService, UserServiceError};

/// Where the second factor is asked
pub const TOTP_CHECK_ROUTE: &str = "/login/2fa";

/// Route reached after login when nothing else was asked for
pub const DEFAULT_LOGIN_ROUTE: &str = "/admin";

/// Local path from the `redirect` query parameter, never another host
pub fn safe_redirect(request: &ServerRequest) -> Option<String> {
    request
        .query_param("redirect")
        .filter(|target| target.starts_with('/') && !target.starts_with("//") && !target.contains('\\'))
        .map(str::to_string)
}

/// Shown when an account or a client address is over its login limit
pub const TOO_MANY_ATTEMPTS: &str = "Too many login attempts, try again later";

/// Check the submitted credentials and open a session
///
/// Accounts with an enabled second factor get a `totp_pending` session and
/// are sent to the code form. The session token goes to a cookie, and to
/// the body for JSON clients. Attempts are counted per client address and
/// failures per email by the [`LoginRateLimiter`].
pub struct Authenticate {
    users: Arc<UserService>,
    totp: Arc<dyn TotpRepository>,
    limiter: Arc<LoginRateLimiter>,
    session_days: i64,
}

impl Authenticate {
    pub fn new(
        users: Arc<UserService>,
        totp: Arc<dyn TotpRepository>,
        limiter: Arc<LoginRateLimiter>,
        session_days: i64,
    ) -> Self {
        Self {
            users,
            totp,
            limiter,
            session_days,
        }
    }
}

#[async_trait]
impl Step for Authenticate {
    async fn cook(&self, workplan: &mut Workplan) -> Result<Flow, StepError> {
        let ip = workplan.require::<ServerRequest>(keys::REQUEST)?.client_ip();
        if let Some(ip) = ip {
            if !self.limiter.allow_request(ip).await {
                warn!("Login requests from {} over the limit", ip);
                return reject_form::<LoginForm>(workplan, GLOBAL_ERRORS, TOO_MANY_ATTEMPTS, StatusCode::TOO_MANY_REQUESTS);
            }
        }

        let form = &workplan.require::<FormState<LoginForm>>(keys::FORM)?.form;
        let email = form.email.trim().to_string();
        if self.limiter.is_limited(&email).await {
            warn!("Login of {} locked after failed attempts", email);
            return reject_form::<LoginForm>(workplan, GLOBAL_ERRORS, TOO_MANY_ATTEMPTS, StatusCode::TOO_MANY_REQUESTS);
        }

        let user = match self.users.authenticate(&form.email, &form.password).await {
            Ok(user) => user,
            Err(UserServiceError::AuthenticationError(message)) => {
                info!("Failed login for {}", email);
                self.limiter.record_failure(&email).await;
                return reject_form::<LoginForm>(workplan, GLOBAL_ERRORS, &message, StatusCode::UNAUTHORIZED);
            }
            Err(e) => return Err(e.into()),
        };
        self.limiter.clear(&email).await;

        let second_factor = self.totp.get(user.id).await?.map_or(false, |auth| auth.enabled);
        let stage = if second_factor {
            SessionStage::TotpPending
        } else {
            SessionStage::Full
        };
        let session = self.users.open_session(user.id, stage).await?;
        info!("User {} logged in ({})", user.id, stage);

        let request = workplan.require::<ServerRequest>(keys::REQUEST)?;
        let wants_json = request.wants_json();
        let target = safe_redirect(request);
        let route = match (second_factor, target) {
            (true, Some(target)) => format!("{}?redirect={}", TOTP_CHECK_ROUTE, urlencoding::encode(&target)),
            (true, None) => TOTP_CHECK_ROUTE.to_string(),
            (false, Some(target)) => target,
            (false, None) => workplan
                .get::<String>(keys::ROUTE)
                .cloned()
                .unwrap_or_else(|| DEFAULT_LOGIN_ROUTE.to_string()),
        };

        let client = workplan.require_mut::<Client>(keys::CLIENT)?;
        client.add_header(
            header::SET_COOKIE,
            &session_cookie(&session.id, self.session_days * 24 * 3600),
        )?;

        if wants_json {
            client.accept_response(Answer::json(
                StatusCode::OK,
                &json!({ "token": session.id, "stage": session.stage, "redirect": route }),
            )?);
            return Ok(Flow::Stop);
        }

        workplan.insert(keys::ROUTE, route);
        workplan.insert(keys::USER, user);
        workplan.insert(keys::SESSION, session);
        Ok(Flow::Continue)
    }
}

/// Close the session of the request and drop its cookie
pub struct CloseSession {
    users: Arc<UserService>,
}

impl CloseSession {
    pub fn new(users: Arc<UserService>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl Step for CloseSession {
    async fn cook(&self, workplan: &mut Workplan) -> Result<Flow, StepError> {
        let token = match workplan.get::<Session>(keys::SESSION) {
            Some(session) => Some(session.id.clone()),
            None => workplan
                .get::<ServerRequest>(keys::REQUEST)
                .and_then(ServerRequest::session_token),
        };

        if let Some(token) = token {
            self.users.close_session(&token).await?;
            info!("Session closed");
        }

        workplan.remove(keys::SESSION);
        workplan.remove(keys::USER);
        workplan
            .require_mut::<Client>(keys::CLIENT)?
            .add_header(header::SET_COOKIE, &clear_session_cookie())?;
        Ok(Flow::Continue)
    }
}

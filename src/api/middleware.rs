//! API middleware
//!
//! Contains middleware for:
//! - Session loading (cookie or bearer token)
//! - Access control of the user and admin areas

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::debug;

use crate::cache::AssetCache;
use crate::config::Config;
use crate::db::repositories::{SqlxSessionRepository, SqlxUserRepository};
use crate::http::{respond, session_token, Client, ServerRequest};
use crate::models::{SessionStage, User};
use crate::recipe::{keys, Recipe, StepError, Workplan};
use crate::services::email::{notifier, RecoveryNotifier};
use crate::services::rate_limiter::LoginRateLimiter;
use crate::services::user::{AuthenticatedUser, UserService};
use crate::steps::auth::TOTP_CHECK_ROUTE;
use crate::steps::recovery::PASSWORD_ROUTE;
use crate::steps::RenderError;
use crate::templating::TemplateEngine;

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: SqlitePool,
    pub engine: Arc<TemplateEngine>,
    pub user_service: Arc<UserService>,
    pub notifier: Arc<dyn RecoveryNotifier>,
    pub rate_limiter: Arc<LoginRateLimiter>,
    pub asset_cache: AssetCache,
}

impl AppState {
    pub fn new(config: Config, pool: SqlitePool, engine: Arc<TemplateEngine>) -> Self {
        let user_service = Arc::new(UserService::with_session_expiration(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxSessionRepository::boxed(pool.clone()),
            config.security.session_days,
        ));
        let notifier = notifier(config.smtp.as_ref(), &config.server.site_name);
        let rate_limiter = Arc::new(LoginRateLimiter::from_config(&config.security));

        Self {
            config: Arc::new(config),
            pool,
            engine,
            user_service,
            notifier,
            rate_limiter,
            asset_cache: AssetCache::new(),
        }
    }
}

/// Stage of a session that was found but may not reach the requested path
#[derive(Debug, Clone, Copy)]
pub struct RestrictedSession(pub SessionStage);

/// Paths a session of `stage` may reach
fn stage_allows(stage: SessionStage, path: &str) -> bool {
    match stage {
        SessionStage::Full => true,
        SessionStage::TotpPending => path == TOTP_CHECK_ROUTE || path == "/logout",
        SessionStage::Recovery => path == PASSWORD_ROUTE || path == "/logout",
    }
}

/// Session loading middleware
///
/// Attaches the [`AuthenticatedUser`] of a valid session when its stage
/// allows the requested path; a session stuck at another stage is only
/// remembered as [`RestrictedSession`], so the request runs anonymously.
pub async fn load_session(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    if let Some(token) = session_token(request.headers()) {
        match state.user_service.validate_session(&token).await {
            Ok(identity) => {
                if identity.is_fully_authenticated() || stage_allows(identity.session.stage, request.uri().path()) {
                    request.extensions_mut().insert(identity);
                } else {
                    request.extensions_mut().insert(RestrictedSession(identity.session.stage));
                }
            }
            Err(e) => debug!("Ignoring session token: {}", e),
        }
    }
    next.run(request).await
}

/// Authentication middleware
///
/// Browsers without a session are sent to the login page and back; sessions
/// waiting for their second factor or a new password are sent to finish it.
pub async fn require_user(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if request.extensions().get::<AuthenticatedUser>().is_some() {
        return next.run(request).await;
    }

    let pending = request.extensions().get::<RestrictedSession>().map(|restricted| restricted.0);
    let target = match pending {
        Some(SessionStage::TotpPending) => Some(TOTP_CHECK_ROUTE.to_string()),
        Some(SessionStage::Recovery) => Some(PASSWORD_ROUTE.to_string()),
        _ => None,
    };

    if wants_html(&request) {
        let location = target.unwrap_or_else(|| login_location(&request));
        return redirect(&location);
    }
    let (server_request, user) = refusal_context(&request);
    refuse(&state, server_request, user, StepError::unauthorized("Authentication required")).await
}

/// Admin authorization middleware, to be layered inside [`require_user`]
pub async fn require_admin(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let admin = request
        .extensions()
        .get::<AuthenticatedUser>()
        .map_or(false, |identity| identity.user.is_admin());

    if !admin {
        let (server_request, user) = refusal_context(&request);
        return refuse(&state, server_request, user, StepError::forbidden("Admin privileges required")).await;
    }
    next.run(request).await
}

fn wants_html(request: &Request) -> bool {
    let json = request
        .headers()
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .map_or(false, |accept| accept.contains("application/json"));
    !json && request.headers().get(header::AUTHORIZATION).is_none()
}

fn login_location(request: &Request) -> String {
    let target = request
        .uri()
        .path_and_query()
        .map(|path| path.as_str())
        .unwrap_or("/");
    format!("/login?redirect={}", urlencoding::encode(target))
}

fn redirect(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::SEE_OTHER, [(header::LOCATION, value)]).into_response(),
        Err(_) => StatusCode::BAD_REQUEST.into_response(),
    }
}

/// Owned parts of a request needed to render a refusal
///
/// The request body is not `Sync`, so nothing borrowed from the request may
/// live across the rendering await.
fn refusal_context(request: &Request) -> (ServerRequest, Option<User>) {
    let mut server_request = ServerRequest::new(request.method().clone(), request.uri().path());
    server_request.headers = request.headers().clone();
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .map(|identity| identity.user.clone());
    (server_request, user)
}

/// Answer with the error page, or `{"error": ...}` for JSON clients
async fn refuse(state: &AppState, server_request: ServerRequest, user: Option<User>, error: StepError) -> Response {
    let recipe = Recipe::new("refuse").on_error(RenderError::new(state.engine.clone()));
    let mut workplan = Workplan::new()
        .with(keys::CLIENT, Client::new())
        .with(keys::REQUEST, server_request);
    if let Some(user) = user {
        workplan.insert(keys::USER, user);
    }

    let workplan = recipe.reject(workplan, error).await;
    respond(&recipe, workplan)
}

//! Login, logout and recovery access

use std::sync::Arc;

use crate::config::SecurityConfig;
use crate::db::repositories::{RecoveryAccessRepository, TotpRepository, UserRepository};
use crate::forms::{LoginForm, PasswordForm, RecoveryForm, TotpCodeForm};
use crate::models::User;
use crate::object::Loader;
use crate::recipe::{keys, Ingredient, Recipe};
use crate::services::email::RecoveryNotifier;
use crate::services::{LoginRateLimiter, TotpService, UserService};
use crate::steps::recovery::RECOVERY_USER;
use crate::steps::{
    Authenticate, CloseSession, ConfirmTotp, FindUserByEmail, FormHandling, FormProcessing, JumpIfNot,
    LoadRecoveryAccess, NotifyUserAboutRecoveryAccess, OpenRecoverySession, PrepareRecoveryAccess, PromoteSession,
    RedirectClient, RemoveRecoveryAccess, Render, RenderError, UpdatePassword, RENDER_FORM,
};
use crate::templating::TemplateEngine;

/// Page shown once a recovery access was asked for, known address or not
pub const RECOVERY_SENT_TEMPLATE: &str = "recovery/sent.html";

const RENDER_SENT: &str = "render_sent";

/// Login form; TOTP accounts continue to `/login/2fa`
pub fn login(
    users: Arc<UserService>,
    totp: Arc<dyn TotpRepository>,
    limiter: Arc<LoginRateLimiter>,
    security: &SecurityConfig,
    engine: Arc<TemplateEngine>,
) -> Recipe {
    Recipe::new("login")
        .require(Ingredient::of::<String>(keys::TEMPLATE))
        .cook(FormHandling::<LoginForm>::new(), "form_handling", 10)
        .cook(FormProcessing::<LoginForm>::new(), "form_processing", 20)
        .cook(Authenticate::new(users, totp, limiter, security.session_days), "authenticate", 30)
        .cook(RedirectClient::from_ingredient(), "redirect_client", 40)
        .cook(Render::from_ingredient(engine.clone()), RENDER_FORM, 50)
        .on_error(RenderError::new(engine))
}

/// Close the session and redirect to `route`
pub fn logout(users: Arc<UserService>, engine: Arc<TemplateEngine>) -> Recipe {
    Recipe::new("logout")
        .require(Ingredient::of::<String>(keys::ROUTE))
        .cook(CloseSession::new(users), "close_session", 10)
        .cook(RedirectClient::from_ingredient(), "redirect_client", 20)
        .on_error(RenderError::new(engine))
}

/// Second factor check of a `totp_pending` session
pub fn login_totp_check(
    users: Arc<UserService>,
    totp: Arc<dyn TotpRepository>,
    service: TotpService,
    limiter: Arc<LoginRateLimiter>,
    engine: Arc<TemplateEngine>,
) -> Recipe {
    Recipe::new("login_totp_check")
        .require(Ingredient::of::<User>(keys::USER))
        .require(Ingredient::of::<String>(keys::TEMPLATE))
        .cook(FormHandling::<TotpCodeForm>::new(), "form_handling", 10)
        .cook(FormProcessing::<TotpCodeForm>::new(), "form_processing", 20)
        .cook(ConfirmTotp::new(totp, service, limiter), "confirm_totp", 30)
        .cook(PromoteSession::new(users), "promote_session", 40)
        .cook(RedirectClient::from_ingredient(), "redirect_client", 50)
        .cook(Render::from_ingredient(engine.clone()), RENDER_FORM, 60)
        .on_error(RenderError::new(engine))
}

/// Ask for a recovery link by email
///
/// The same page follows whether the address belongs to a user or not.
pub fn prepare_recovery_access(
    users: Arc<dyn UserRepository>,
    accesses: Arc<dyn RecoveryAccessRepository>,
    notifier: Arc<dyn RecoveryNotifier>,
    security: &SecurityConfig,
    base_url: &str,
    engine: Arc<TemplateEngine>,
) -> Recipe {
    Recipe::new("prepare_recovery_access")
        .require(Ingredient::of::<String>(keys::TEMPLATE))
        .cook(FormHandling::<RecoveryForm>::new(), "form_handling", 10)
        .cook(FormProcessing::<RecoveryForm>::new(), "form_processing", 20)
        .cook(FindUserByEmail::new(users), "find_user", 30)
        .cook(JumpIfNot::new(RECOVERY_USER, RENDER_SENT), "jump_if_unknown", 40)
        .cook(
            PrepareRecoveryAccess::new(accesses, security.recovery_ttl_minutes),
            "prepare_recovery_access",
            50,
        )
        .cook(NotifyUserAboutRecoveryAccess::new(notifier, base_url), "notify_user", 60)
        .cook(Render::fixed(engine.clone(), RECOVERY_SENT_TEMPLATE), RENDER_SENT, 70)
        .cook(Render::from_ingredient(engine.clone()), RENDER_FORM, 80)
        .on_error(RenderError::new(engine))
}

/// Follow a recovery link: open a `recovery` session, then the password form
pub fn recovery_access(
    users: Arc<UserService>,
    user_loader: Arc<dyn Loader<User>>,
    accesses: Arc<dyn RecoveryAccessRepository>,
    security: &SecurityConfig,
    engine: Arc<TemplateEngine>,
) -> Recipe {
    Recipe::new("recovery_access")
        .cook(LoadRecoveryAccess::new(accesses, user_loader), "load_recovery_access", 10)
        .cook(OpenRecoverySession::new(users, security.session_days), "open_session", 20)
        .cook(RedirectClient::from_ingredient(), "redirect_client", 30)
        .on_error(RenderError::new(engine))
}

/// Password form of the current user
pub fn change_password(
    users: Arc<UserService>,
    accesses: Arc<dyn RecoveryAccessRepository>,
    engine: Arc<TemplateEngine>,
) -> Recipe {
    Recipe::new("change_password")
        .require(Ingredient::of::<User>(keys::USER))
        .require(Ingredient::of::<String>(keys::ROUTE))
        .require(Ingredient::of::<String>(keys::TEMPLATE))
        .cook(FormHandling::<PasswordForm>::new(), "form_handling", 10)
        .cook(FormProcessing::<PasswordForm>::new(), "form_processing", 20)
        .cook(UpdatePassword::new(users), "update_password", 30)
        .cook(RemoveRecoveryAccess::new(accesses), "remove_recovery_access", 40)
        .cook(RedirectClient::from_ingredient(), "redirect_client", 50)
        .cook(Render::from_ingredient(engine.clone()), RENDER_FORM, 60)
        .on_error(RenderError::new(engine))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxRecoveryAccessRepository, SqlxTotpRepository, SqlxUserRepository};
    use crate::http::{RouteDefaults, ServerRequest};
    use crate::models::{Session, SessionStage};
    use crate::recipe::Workplan;
    use crate::services::email::testing::RecordingNotifier;
    use crate::steps::auth::tests::users;
    use crate::steps::testing::{answer, engine, pool, sent_cookie, workplan};
    use axum::http::{header, StatusCode};
    use serde_json::json;

    fn security() -> SecurityConfig {
        SecurityConfig::default()
    }

    fn limiter() -> Arc<LoginRateLimiter> {
        Arc::new(LoginRateLimiter::from_config(&security()))
    }

    fn seeded(request: ServerRequest, defaults: RouteDefaults) -> Workplan {
        let mut workplan = workplan(request);
        defaults.apply(&mut workplan);
        workplan
    }

    #[tokio::test]
    async fn test_login_sets_cookie_and_redirects() {
        let pool = pool().await;
        let recipe = login(users(&pool).await, SqlxTotpRepository::boxed(pool), limiter(), &security(), engine());
        let request = ServerRequest::post(
            "/login",
            json!({"email": "admin@example.com", "password": "correct-horse"}),
        );

        let workplan = recipe
            .execute(seeded(request, RouteDefaults::new().route("/admin").template("form.html")))
            .await;
        let answer = answer(&workplan);
        assert_eq!(answer.status, StatusCode::SEE_OTHER);
        assert_eq!(answer.headers[header::LOCATION], "/admin");
        assert!(sent_cookie(&workplan).starts_with("session="));
    }

    #[tokio::test]
    async fn test_login_failure_renders_form() {
        let pool = pool().await;
        let recipe = login(users(&pool).await, SqlxTotpRepository::boxed(pool), limiter(), &security(), engine());
        let request = ServerRequest::post("/login", json!({"email": "admin@example.com", "password": "nope-nope"}));

        let workplan = recipe
            .execute(seeded(request, RouteDefaults::new().template("form.html")))
            .await;
        assert_eq!(answer(&workplan).status, StatusCode::UNAUTHORIZED);
        assert!(answer(&workplan).body_text().contains("Invalid email or password"));
    }

    #[tokio::test]
    async fn test_logout() {
        let pool = pool().await;
        let users = users(&pool).await;
        let session = users.open_session(1, SessionStage::Full).await.unwrap();

        let plan = seeded(ServerRequest::post("/logout", json!({})), RouteDefaults::new().route("/"))
            .with(keys::SESSION, session.clone());
        let plan = logout(users.clone(), engine()).execute(plan).await;

        assert_eq!(answer(&plan).headers[header::LOCATION], "/");
        assert!(sent_cookie(&plan).contains("Max-Age=0"));
        assert!(users.validate_session(&session.id).await.is_err());
    }

    #[tokio::test]
    async fn test_recovery_same_page_for_unknown_address() {
        let pool = pool().await;
        users(&pool).await;
        let notifier = Arc::new(RecordingNotifier::default());
        let recipe = prepare_recovery_access(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxRecoveryAccessRepository::boxed(pool),
            notifier.clone(),
            &security(),
            "https://east.example",
            engine(),
        );
        let defaults = || RouteDefaults::new().template("form.html");

        let known = recipe
            .execute(seeded(ServerRequest::post("/recovery", json!({"email": "admin@example.com"})), defaults()))
            .await;
        let unknown = recipe
            .execute(seeded(ServerRequest::post("/recovery", json!({"email": "ghost@example.com"})), defaults()))
            .await;

        assert_eq!(answer(&known).status, answer(&unknown).status);
        assert_eq!(notifier.sent.lock().unwrap().len(), 1);
        assert!(!unknown.contains(crate::steps::recovery::RECOVERY_TOKEN));
    }

    #[tokio::test]
    async fn test_recovery_link_then_password_change() {
        let pool = pool().await;
        let users = users(&pool).await;
        let accesses = SqlxRecoveryAccessRepository::boxed(pool.clone());
        let notifier = Arc::new(RecordingNotifier::default());

        prepare_recovery_access(
            SqlxUserRepository::boxed(pool.clone()),
            accesses.clone(),
            notifier.clone(),
            &security(),
            "https://east.example",
            engine(),
        )
        .execute(seeded(
            ServerRequest::post("/recovery", json!({"email": "admin@example.com"})),
            RouteDefaults::new().template("form.html"),
        ))
        .await;
        let link = notifier.last_link().unwrap();
        let token = link.rsplit("token=").next().unwrap();

        let opened = recovery_access(
            users.clone(),
            SqlxUserRepository::boxed(pool.clone()),
            accesses.clone(),
            &security(),
            engine(),
        )
        .execute(workplan(ServerRequest::get("/recovery/access").with_query("token", token)))
        .await;
        assert_eq!(answer(&opened).headers[header::LOCATION], "/user/password");
        let session = opened.get::<Session>(keys::SESSION).unwrap().clone();
        let user = opened.get::<User>(keys::USER).unwrap().clone();

        let request = ServerRequest::post(
            "/user/password",
            json!({"password": "battery-staple", "confirmation": "battery-staple"}),
        );
        let plan = seeded(request, RouteDefaults::new().route("/").template("form.html"))
            .with(keys::USER, user)
            .with(keys::SESSION, session);
        let changed = change_password(users.clone(), accesses.clone(), engine()).execute(plan).await;

        assert_eq!(answer(&changed).headers[header::LOCATION], "/login");
        assert!(users.authenticate("admin@example.com", "battery-staple").await.is_ok());

        // The link is single use
        let reused = recovery_access(users, SqlxUserRepository::boxed(pool), accesses, &security(), engine())
            .execute(workplan(ServerRequest::get("/recovery/access").with_query("token", token)))
            .await;
        assert_eq!(answer(&reused).status, StatusCode::NOT_FOUND);
    }
}

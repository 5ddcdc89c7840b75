//! Second factor management of the current user

use std::sync::Arc;

use crate::db::repositories::TotpRepository;
use crate::forms::TotpCodeForm;
use crate::models::User;
use crate::recipe::{keys, Ingredient, Recipe};
use crate::services::{LoginRateLimiter, TotpService};
use crate::steps::{
    ConfirmTotp, DisableTotp, EnableTotp, FormHandling, FormProcessing, LoadTotpStatus, RedirectClient, Render,
    RenderError, ValidateTotp, RENDER_FORM,
};
use crate::templating::TemplateEngine;

fn for_user(name: &str) -> Recipe {
    Recipe::new(name).require(Ingredient::of::<User>(keys::USER))
}

/// Whether the user has a second factor
pub fn totp_status(totp: Arc<dyn TotpRepository>, engine: Arc<TemplateEngine>) -> Recipe {
    for_user("totp_status")
        .require(Ingredient::of::<String>(keys::TEMPLATE))
        .cook(LoadTotpStatus::new(totp), "load_totp_status", 10)
        .cook(Render::from_ingredient(engine.clone()), "render", 20)
        .on_error(RenderError::new(engine))
}

/// Show the secret and QR code to enroll, with the confirmation form
pub fn enable_totp(totp: Arc<dyn TotpRepository>, service: TotpService, engine: Arc<TemplateEngine>) -> Recipe {
    for_user("enable_totp")
        .require(Ingredient::of::<String>(keys::TEMPLATE))
        .cook(EnableTotp::new(totp, service), "enable_totp", 10)
        .cook(FormHandling::<TotpCodeForm>::new(), "form_handling", 20)
        .cook(Render::from_ingredient(engine.clone()), RENDER_FORM, 30)
        .on_error(RenderError::new(engine))
}

/// Enable the pending secret with a first valid code
pub fn validate_totp(totp: Arc<dyn TotpRepository>, service: TotpService, engine: Arc<TemplateEngine>) -> Recipe {
    for_user("validate_totp")
        .require(Ingredient::of::<String>(keys::ROUTE))
        .require(Ingredient::of::<String>(keys::TEMPLATE))
        .cook(EnableTotp::new(totp.clone(), service.clone()), "enable_totp", 10)
        .cook(FormHandling::<TotpCodeForm>::new(), "form_handling", 20)
        .cook(FormProcessing::<TotpCodeForm>::new(), "form_processing", 30)
        .cook(ValidateTotp::new(totp, service), "validate_totp", 40)
        .cook(RedirectClient::from_ingredient(), "redirect_client", 50)
        .cook(Render::from_ingredient(engine.clone()), RENDER_FORM, 60)
        .on_error(RenderError::new(engine))
}

/// Remove the second factor, given a valid code
pub fn disable_totp(
    totp: Arc<dyn TotpRepository>,
    service: TotpService,
    limiter: Arc<LoginRateLimiter>,
    engine: Arc<TemplateEngine>,
) -> Recipe {
    for_user("disable_totp")
        .require(Ingredient::of::<String>(keys::ROUTE))
        .require(Ingredient::of::<String>(keys::TEMPLATE))
        .cook(FormHandling::<TotpCodeForm>::new(), "form_handling", 10)
        .cook(FormProcessing::<TotpCodeForm>::new(), "form_processing", 20)
        .cook(ConfirmTotp::new(totp.clone(), service, limiter), "confirm_totp", 30)
        .cook(DisableTotp::new(totp), "disable_totp", 40)
        .cook(RedirectClient::from_ingredient(), "redirect_client", 50)
        .cook(Render::from_ingredient(engine.clone()), RENDER_FORM, 60)
        .on_error(RenderError::new(engine))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::SqlxTotpRepository;
    use crate::http::{RouteDefaults, ServerRequest};
    use crate::models::TotpAuth;
    use crate::recipe::Workplan;
    use crate::steps::auth::tests::users;
    use crate::steps::testing::{answer, engine, pool, workplan};
    use axum::http::{header, StatusCode};
    use serde_json::json;

    /// TOTP repository over a database holding user 1
    async fn totp_repo() -> Arc<dyn TotpRepository> {
        let pool = pool().await;
        users(&pool).await;
        SqlxTotpRepository::boxed(pool)
    }

    fn service() -> TotpService {
        TotpService::new("East", 6, 30)
    }

    fn plan(request: ServerRequest) -> Workplan {
        let user = User {
            id: 1,
            ..User::new("admin@example.com", "Ada", "Admin")
        };
        let mut workplan = workplan(request).with(keys::USER, user);
        RouteDefaults::new().route("/user/totp").template("form.html").apply(&mut workplan);
        workplan
    }

    #[tokio::test]
    async fn test_enrollment() {
        let totp = totp_repo().await;

        let shown = enable_totp(totp.clone(), service(), engine())
            .execute(plan(ServerRequest::get("/user/totp/enable")))
            .await;
        assert_eq!(answer(&shown).status, StatusCode::OK);
        let pending = totp.get(1).await.unwrap().unwrap();
        assert!(!pending.enabled);

        let code = service().current_code(&pending).unwrap();
        let validated = validate_totp(totp.clone(), service(), engine())
            .execute(plan(ServerRequest::post("/user/totp/validate", json!({ "code": code }))))
            .await;
        assert_eq!(answer(&validated).headers[header::LOCATION], "/user/totp");
        assert!(totp.get(1).await.unwrap().unwrap().enabled);

        let status = totp_status(totp, engine())
            .execute(plan(ServerRequest::get("/user/totp")))
            .await;
        assert_eq!(status.view()["totp_enabled"], true);
    }

    #[tokio::test]
    async fn test_disable_needs_valid_code() {
        let totp = totp_repo().await;
        let auth = TotpAuth {
            enabled: true,
            ..service().generate(1)
        };
        totp.save(&auth).await.unwrap();
        let recipe = disable_totp(totp.clone(), service(), Arc::new(LoginRateLimiter::default()), engine());

        let refused = recipe
            .execute(plan(ServerRequest::post("/user/totp/disable", json!({"code": "000000x"}))))
            .await;
        assert_eq!(answer(&refused).status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(totp.get(1).await.unwrap().is_some());

        let code = service().current_code(&auth).unwrap();
        let done = recipe
            .execute(plan(ServerRequest::post("/user/totp/disable", json!({ "code": code }))))
            .await;
        assert_eq!(answer(&done).status, StatusCode::SEE_OTHER);
        assert!(totp.get(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_requires_user() {
        let totp = totp_repo().await;
        let workplan = totp_status(totp, engine())
            .execute(workplan(ServerRequest::get("/user/totp")))
            .await;
        assert_eq!(answer(&workplan).status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}

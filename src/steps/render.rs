//! Rendering steps: templates, error pages and redirections

use async_trait::async_trait;
use axum::http::StatusCode;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::error;

use crate::http::{cache, Answer, Client, ServerRequest};
use crate::models::User;
use crate::recipe::{keys, Flow, Step, StepError, Workplan};
use crate::templating::TemplateEngine;

/// Template used by [`RenderError`] when the route does not name one
pub const DEFAULT_ERROR_TEMPLATE: &str = "error.html";

enum TemplateName {
    /// Read from the `template` ingredient
    Ingredient,
    Fixed(String),
}

fn wants_json(workplan: &Workplan) -> bool {
    workplan
        .get::<ServerRequest>(keys::REQUEST)
        .map_or(false, ServerRequest::wants_json)
}

/// View parameters completed with the visitor
fn view_with_user(workplan: &Workplan) -> Map<String, Value> {
    let mut view = workplan.view().clone();
    if !view.contains_key("current_user") {
        let user = workplan
            .get::<User>(keys::USER)
            .and_then(|user| serde_json::to_value(user).ok())
            .unwrap_or(Value::Null);
        view.insert("current_user".to_string(), user);
    }
    view
}

/// Answer with a template rendered from the view parameters
///
/// JSON clients receive the view parameters themselves. The status is read
/// from the `status` ingredient, 200 when absent.
pub struct Render {
    engine: Arc<TemplateEngine>,
    template: TemplateName,
}

impl Render {
    pub fn from_ingredient(engine: Arc<TemplateEngine>) -> Self {
        Self {
            engine,
            template: TemplateName::Ingredient,
        }
    }

    pub fn fixed(engine: Arc<TemplateEngine>, template: &str) -> Self {
        Self {
            engine,
            template: TemplateName::Fixed(template.to_string()),
        }
    }
}

#[async_trait]
impl Step for Render {
    async fn cook(&self, workplan: &mut Workplan) -> Result<Flow, StepError> {
        let status = workplan.get::<StatusCode>(keys::STATUS).copied().unwrap_or(StatusCode::OK);

        let answer = if wants_json(workplan) {
            Answer::json(status, workplan.view())?
        } else {
            let template = match &self.template {
                TemplateName::Fixed(template) => template.clone(),
                TemplateName::Ingredient => workplan.require::<String>(keys::TEMPLATE)?.clone(),
            };
            let html = self
                .engine
                .render(&template, &view_with_user(workplan))
                .map_err(anyhow::Error::from)?;
            Answer::html(status, html)?
        };

        let answer = if workplan.contains(keys::USER) {
            answer.with_header(axum::http::header::CACHE_CONTROL, &cache::cache_control_private(0))?
        } else {
            answer
        };

        workplan.require_mut::<Client>(keys::CLIENT)?.accept_response(answer);
        Ok(Flow::Stop)
    }
}

/// Error bowl step: answer with the error of the workplan
///
/// HTML clients get the `error_template` ingredient (or `error.html`)
/// rendered with `status`, `code` and `message`; JSON clients get
/// `{"error": {"code", "message"}}`. Messages of server errors are never
/// shown.
pub struct RenderError {
    engine: Arc<TemplateEngine>,
}

impl RenderError {
    pub fn new(engine: Arc<TemplateEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Step for RenderError {
    async fn cook(&self, workplan: &mut Workplan) -> Result<Flow, StepError> {
        let (status, code, message) = match workplan.get::<StepError>(keys::ERROR) {
            Some(error) => (error.status(), error.code(), error.public_message()),
            None => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Internal server error".to_string(),
            ),
        };

        let answer = if wants_json(workplan) {
            Answer::json(status, &json!({ "error": { "code": code, "message": message } }))?
        } else {
            let template = workplan
                .get::<String>(keys::ERROR_TEMPLATE)
                .cloned()
                .unwrap_or_else(|| DEFAULT_ERROR_TEMPLATE.to_string());

            let mut view = view_with_user(workplan);
            view.insert("status".to_string(), json!(status.as_u16()));
            view.insert("code".to_string(), json!(code));
            view.insert("message".to_string(), json!(message));

            let html = match self.engine.render(&template, &view) {
                Ok(html) => html,
                Err(e) => {
                    error!("Failed to render error template: {}", e);
                    fallback_page(status, &message)
                }
            };
            Answer::html(status, html)?
        };
        let answer = answer.with_header(axum::http::header::CACHE_CONTROL, &cache::cache_control_no_cache())?;

        workplan.require_mut::<Client>(keys::CLIENT)?.error_in_request(answer);
        Ok(Flow::Stop)
    }
}

fn fallback_page(status: StatusCode, message: &str) -> String {
    let escaped = message
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;");
    format!(
        "<!DOCTYPE html><html><head><title>{0}</title></head><body><h1>{0}</h1><p>{1}</p></body></html>",
        status, escaped
    )
}

enum RouteSource {
    Ingredient,
    Fixed(String),
}

/// Redirect the client with a 303
///
/// `{id}` in the route is replaced by the `id` ingredient. JSON clients get
/// the view parameters instead, with the target under `redirect`.
pub struct RedirectClient {
    route: RouteSource,
}

impl RedirectClient {
    /// Redirect to the `route` ingredient
    pub fn from_ingredient() -> Self {
        Self {
            route: RouteSource::Ingredient,
        }
    }

    pub fn fixed(route: &str) -> Self {
        Self {
            route: RouteSource::Fixed(route.to_string()),
        }
    }
}

#[async_trait]
impl Step for RedirectClient {
    async fn cook(&self, workplan: &mut Workplan) -> Result<Flow, StepError> {
        let route = match &self.route {
            RouteSource::Fixed(route) => route.clone(),
            RouteSource::Ingredient => workplan.require::<String>(keys::ROUTE)?.clone(),
        };
        let route = match workplan.get::<i64>(keys::ID) {
            Some(id) => route.replace("{id}", &id.to_string()),
            None => route,
        };

        let answer = if wants_json(workplan) {
            let mut view = workplan.view().clone();
            view.insert("redirect".to_string(), json!(route));
            Answer::json(StatusCode::OK, &view)?
        } else {
            Answer::redirect(&route)?
        };

        workplan.require_mut::<Client>(keys::CLIENT)?.accept_response(answer);
        Ok(Flow::Stop)
    }
}

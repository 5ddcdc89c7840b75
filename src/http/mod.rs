//! HTTP adapters between axum and recipes
//!
//! An [`Endpoint`] pairs a recipe with the [`RouteDefaults`] of one route.
//! For every request it seeds a workplan (client, request, route defaults,
//! authenticated user, `id`/`slug` route parameters), cooks the recipe and
//! turns the [`Client`] into the axum response.

pub mod cache;
mod client;
mod request;

pub use client::{Answer, Client};
pub use request::{session_token, ServerRequest, UploadedFile};

use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use axum::routing::{on, MethodFilter, MethodRouter};
use std::any::Any;
use std::sync::Arc;
use tracing::error;

use crate::object::Direction;
use crate::recipe::{keys, Recipe, StepError, Workplan};
use crate::services::user::AuthenticatedUser;

/// Name of the cookie holding the session token
pub const SESSION_COOKIE: &str = "session";

/// `Set-Cookie` value opening a session
pub fn session_cookie(token: &str, max_age_seconds: i64) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE, token, max_age_seconds
    )
}

/// `Set-Cookie` value removing the session cookie
pub fn clear_session_cookie() -> String {
    format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", SESSION_COOKIE)
}

type Seed = Arc<dyn Fn(&mut Workplan) + Send + Sync>;

/// Ingredients attached to a route
#[derive(Clone, Default)]
pub struct RouteDefaults {
    seeds: Vec<Seed>,
}

impl RouteDefaults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<T>(mut self, name: &'static str, value: T) -> Self
    where
        T: Any + Clone + Send + Sync,
    {
        self.seeds.push(Arc::new(move |workplan: &mut Workplan| {
            workplan.insert(name, value.clone())
        }));
        self
    }

    /// Route redirected to once the request succeeded
    pub fn route(self, route: &str) -> Self {
        self.with(keys::ROUTE, route.to_string())
    }

    pub fn template(self, template: &str) -> Self {
        self.with(keys::TEMPLATE, template.to_string())
    }

    pub fn error_template(self, template: &str) -> Self {
        self.with(keys::ERROR_TEMPLATE, template.to_string())
    }

    pub fn items_per_page(self, items: u32) -> Self {
        self.with(keys::ITEMS_PER_PAGE, items)
    }

    pub fn default_order_direction(self, direction: Direction) -> Self {
        self.with(keys::DEFAULT_ORDER_DIRECTION, direction)
    }

    /// View parameter every render of the route receives
    pub fn view(mut self, name: &'static str, value: impl Into<serde_json::Value>) -> Self {
        let value = value.into();
        self.seeds.push(Arc::new(move |workplan: &mut Workplan| {
            workplan.view_mut().insert(name.to_string(), value.clone());
        }));
        self
    }

    pub fn apply(&self, workplan: &mut Workplan) {
        for seed in &self.seeds {
            seed(workplan);
        }
    }
}

/// Cook a recipe and answer with whatever its client received
pub async fn dispatch(recipe: &Recipe, workplan: Workplan) -> Response {
    respond(recipe, recipe.execute(workplan).await)
}

/// Answer with whatever the client of a cooked workplan received
pub fn respond(recipe: &Recipe, mut workplan: Workplan) -> Response {
    match workplan.take::<Client>(keys::CLIENT) {
        Some(client) => {
            if !client.has_response() {
                error!("Recipe '{}' finished without answering the client", recipe.name());
            }
            client.into_response()
        }
        None => {
            error!("Recipe '{}' lost its client", recipe.name());
            Client::new().into_response()
        }
    }
}

/// A recipe bound to a route
#[derive(Clone)]
pub struct Endpoint {
    recipe: Arc<Recipe>,
    defaults: RouteDefaults,
}

impl Endpoint {
    pub fn new(recipe: Recipe, defaults: RouteDefaults) -> Self {
        Self {
            recipe: Arc::new(recipe),
            defaults,
        }
    }

    pub fn recipe(&self) -> &Recipe {
        &self.recipe
    }

    /// Workplan with a fresh client and the route defaults
    pub fn workplan(&self) -> Workplan {
        let mut workplan = Workplan::new().with(keys::CLIENT, Client::new());
        self.defaults.apply(&mut workplan);
        workplan
    }

    pub async fn handle(&self, request: Request) -> Response {
        let mut workplan = self.workplan();

        if let Some(identity) = request.extensions().get::<AuthenticatedUser>() {
            workplan.insert(keys::USER, identity.user.clone());
            workplan.insert(keys::SESSION, identity.session.clone());
        }

        let server_request = match ServerRequest::from_request(request).await {
            Ok(server_request) => server_request,
            Err(error) => return respond(&self.recipe, self.recipe.reject(workplan, error).await),
        };

        if let Some(id) = server_request.param("id") {
            match id.parse::<i64>() {
                Ok(id) => workplan.insert(keys::ID, id),
                Err(_) => {
                    let error = StepError::not_found(format!("Unknown identifier '{}'", id));
                    workplan.insert(keys::REQUEST, server_request);
                    return respond(&self.recipe, self.recipe.reject(workplan, error).await);
                }
            }
        }
        if let Some(slug) = server_request.param("slug") {
            workplan.insert(keys::SLUG, slug.to_string());
        }

        workplan.insert(keys::REQUEST, server_request);
        dispatch(&self.recipe, workplan).await
    }

    /// Route answering the given methods with this endpoint
    pub fn on<S>(self, filter: MethodFilter) -> MethodRouter<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        on(filter, move |request: Request| {
            let endpoint = self.clone();
            async move { endpoint.handle(request).await }
        })
    }

    pub fn get<S>(self) -> MethodRouter<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        self.on(MethodFilter::GET)
    }

    pub fn post<S>(self) -> MethodRouter<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        self.on(MethodFilter::POST)
    }

    /// GET shows the form, POST submits it
    pub fn form<S>(self) -> MethodRouter<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        self.on(MethodFilter::GET.or(MethodFilter::POST))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::{from_fn, Flow};
    use axum::body::Body;
    use axum::http::StatusCode;

    fn echo_recipe() -> Recipe {
        Recipe::new("echo").cook(
            from_fn(|workplan: &mut Workplan| {
                let id = workplan.get::<i64>(keys::ID).copied().unwrap_or_default();
                let route = workplan.get::<String>(keys::ROUTE).cloned().unwrap_or_default();
                let body = format!("{} {}", id, route);
                workplan
                    .require_mut::<Client>(keys::CLIENT)?
                    .accept_response(Answer::new(StatusCode::OK).with_body("text/plain", body)?);
                Ok(Flow::Stop)
            }),
            "echo",
            0,
        )
    }

    #[test]
    fn test_session_cookies() {
        assert_eq!(
            session_cookie("abc", 60),
            "session=abc; Path=/; HttpOnly; SameSite=Lax; Max-Age=60"
        );
        assert!(clear_session_cookie().ends_with("Max-Age=0"));
    }

    #[test]
    fn test_route_defaults_seed_workplan() {
        let defaults = RouteDefaults::new()
            .route("/admin/contents")
            .items_per_page(20)
            .default_order_direction(Direction::Desc);
        let mut workplan = Workplan::new();
        defaults.apply(&mut workplan);

        assert_eq!(workplan.get::<String>(keys::ROUTE).unwrap(), "/admin/contents");
        assert_eq!(workplan.get::<u32>(keys::ITEMS_PER_PAGE), Some(&20));
        assert_eq!(workplan.get::<Direction>(keys::DEFAULT_ORDER_DIRECTION), Some(&Direction::Desc));
    }

    #[tokio::test]
    async fn test_dispatch_without_answer_is_500() {
        let recipe = Recipe::new("silent");
        let response = dispatch(&recipe, Workplan::new().with(keys::CLIENT, Client::new())).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_endpoint_handles_request() {
        let endpoint = Endpoint::new(echo_recipe(), RouteDefaults::new().route("/done"));
        let response = endpoint
            .handle(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"0 /done");
    }
}

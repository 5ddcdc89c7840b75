//! API layer - routing
//!
//! Every route is an [`Endpoint`]: a recipe from [`crate::endpoints`] with
//! the defaults of the route. This module contains:
//! - Public pages, media and minified assets
//! - Login, logout and recovery access
//! - The user area (password, second factor)
//! - The admin area (CRUD of contents, types, categories, items, users and media)

pub mod middleware;

use axum::{extract::DefaultBodyLimit, middleware as axum_middleware, Router};
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;

use crate::db::repositories::{
    SqlxCategoryRepository, SqlxContentRepository, SqlxContentTypeRepository, SqlxItemRepository,
    SqlxMediaRepository, SqlxRecoveryAccessRepository, SqlxTotpRepository, SqlxUserRepository,
};
use crate::endpoints::{
    change_password, create_object, delete_object, disable_totp, dynamic_content, edit_object, enable_totp,
    list_objects, login, login_totp_check, logout, media_file_removal, minifier, prepare_recovery_access,
    recovery_access, render_media, slug_steps, static_content, totp_status, upload_media, validate_totp,
};
use crate::forms::{CategoryForm, ContentForm, ContentTypeForm, ItemForm, MediaForm, ObjectForm, UserForm};
use crate::http::{Endpoint, RouteDefaults};
use crate::models::{Category, Content, ContentType, Item, Media, User};
use crate::object::{Loader, Object, Writer};
use crate::recipe::AdditionalSteps;
use crate::services::TotpService;
use crate::steps::auth::TOTP_CHECK_ROUTE;
use crate::steps::recovery::PASSWORD_ROUTE;

pub use middleware::{load_session, require_admin, require_user, AppState, RestrictedSession};

/// Room left around uploads for the other multipart fields
const BODY_LIMIT_MARGIN: usize = 64 * 1024;

/// Listing, creation, edition and removal of one kind of object
///
/// Routes live under `/admin/{section}`; the creation route is left to the
/// caller since media are created from an upload. `editing` extends the edit
/// recipe, `removal` the delete one.
fn admin_section<T, F>(
    state: &AppState,
    section: &str,
    loader: Arc<dyn Loader<T>>,
    writer: Arc<dyn Writer<T>>,
    editing: &AdditionalSteps,
    removal: &AdditionalSteps,
) -> Router<AppState>
where
    T: Object,
    F: ObjectForm<T>,
{
    let engine = &state.engine;
    let listing = &state.config.listing;
    let base = format!("/admin/{}", section);

    let list = RouteDefaults::new()
        .template("admin/list.html")
        .items_per_page(listing.items_per_page)
        .default_order_direction(listing.default_order_direction)
        .view("section", section)
        .view("kind", T::KIND);
    let edit = RouteDefaults::new()
        .template("admin/form.html")
        .view("section", section)
        .view("kind", T::KIND);
    let delete = RouteDefaults::new().route(&base);

    Router::new()
        .route(&base, Endpoint::new(list_objects(loader.clone(), engine.clone()), list).get())
        .route(
            &format!("{}/{{id}}", base),
            Endpoint::new(edit_object::<T, F>(loader.clone(), writer.clone(), engine.clone(), editing), edit).form(),
        )
        .route(
            &format!("{}/{{id}}/delete", base),
            Endpoint::new(delete_object::<T>(loader, writer, engine.clone(), removal), delete).post(),
        )
}

/// Creation form of a section, redirecting to the edition page once saved
fn admin_create<T, F>(state: &AppState, section: &str, writer: Arc<dyn Writer<T>>, additional: &AdditionalSteps) -> Router<AppState>
where
    T: Object,
    F: ObjectForm<T>,
{
    let defaults = RouteDefaults::new()
        .route(&format!("/admin/{}/{{id}}", section))
        .template("admin/form.html")
        .view("section", section)
        .view("kind", T::KIND);

    Router::new().route(
        &format!("/admin/{}/new", section),
        Endpoint::new(create_object::<T, F>(writer, state.engine.clone(), additional), defaults).form(),
    )
}

/// Build the admin router (needs the admin role)
pub fn build_admin_router(state: &AppState) -> Router<AppState> {
    let pool = &state.pool;
    let contents = SqlxContentRepository::boxed(pool.clone());
    let types = SqlxContentTypeRepository::boxed(pool.clone());
    let categories = SqlxCategoryRepository::boxed(pool.clone());
    let items = SqlxItemRepository::boxed(pool.clone());
    let users = SqlxUserRepository::boxed(pool.clone());
    let media = SqlxMediaRepository::boxed(pool.clone());

    let content_slugs = slug_steps::<Content>(contents.clone());
    let category_slugs = slug_steps::<Category>(categories.clone());
    let item_slugs = slug_steps::<Item>(items.clone());
    let none = AdditionalSteps::new();
    let media_root = state.config.media.path.clone();

    let upload = RouteDefaults::new()
        .route("/admin/media/{id}")
        .template("admin/upload.html")
        .view("section", "media")
        .view("kind", Media::KIND);
    let dashboard = RouteDefaults::new().template("admin/index.html");

    Router::new()
        .route("/admin", Endpoint::new(static_content(state.engine.clone()), dashboard).get())
        .merge(admin_section::<Content, ContentForm>(state, "content", contents.clone(), contents.clone(), &content_slugs, &none))
        .merge(admin_create::<Content, ContentForm>(state, "content", contents, &content_slugs))
        .merge(admin_section::<ContentType, ContentTypeForm>(state, "types", types.clone(), types.clone(), &none, &none))
        .merge(admin_create::<ContentType, ContentTypeForm>(state, "types", types, &none))
        .merge(admin_section::<Category, CategoryForm>(state, "categories", categories.clone(), categories.clone(), &category_slugs, &none))
        .merge(admin_create::<Category, CategoryForm>(state, "categories", categories, &category_slugs))
        .merge(admin_section::<Item, ItemForm>(state, "items", items.clone(), items.clone(), &item_slugs, &none))
        .merge(admin_create::<Item, ItemForm>(state, "items", items, &item_slugs))
        .merge(admin_section::<User, UserForm>(state, "users", users.clone(), users.clone(), &none, &none))
        .merge(admin_create::<User, UserForm>(state, "users", users, &none))
        .merge(admin_section::<Media, MediaForm>(
            state,
            "media",
            media.clone(),
            media.clone(),
            &none,
            &media_file_removal(media_root),
        ))
        .route(
            "/admin/media/new",
            Endpoint::new(upload_media(media, state.config.media.clone(), state.engine.clone()), upload).form(),
        )
        .route_layer(axum_middleware::from_fn_with_state(state.clone(), require_admin))
        .route_layer(axum_middleware::from_fn_with_state(state.clone(), require_user))
}

/// Build the user router (password and second factor of the current user)
pub fn build_user_router(state: &AppState) -> Router<AppState> {
    let engine = &state.engine;
    let users = &state.user_service;
    let totp = SqlxTotpRepository::boxed(state.pool.clone());
    let accesses = SqlxRecoveryAccessRepository::boxed(state.pool.clone());
    let service = TotpService::from_config(&state.config.security);

    let totp_check = RouteDefaults::new().route("/").template("login_2fa.html");
    let password = RouteDefaults::new().route(PASSWORD_ROUTE).template("user/password.html");
    let status = RouteDefaults::new().template("totp/status.html");
    let enable = RouteDefaults::new().route("/user/totp").template("totp/enable.html");
    let disable = RouteDefaults::new().route("/user/totp").template("totp/disable.html");

    Router::new()
        .route(
            TOTP_CHECK_ROUTE,
            Endpoint::new(
                login_totp_check(
                    users.clone(),
                    totp.clone(),
                    service.clone(),
                    state.rate_limiter.clone(),
                    engine.clone(),
                ),
                totp_check,
            )
            .form(),
        )
        .route(
            PASSWORD_ROUTE,
            Endpoint::new(change_password(users.clone(), accesses, engine.clone()), password).form(),
        )
        .route("/user/totp", Endpoint::new(totp_status(totp.clone(), engine.clone()), status).get())
        .route(
            "/user/totp/enable",
            Endpoint::new(enable_totp(totp.clone(), service.clone(), engine.clone()), enable.clone()).get(),
        )
        .route(
            "/user/totp/validate",
            Endpoint::new(validate_totp(totp.clone(), service.clone(), engine.clone()), enable).post(),
        )
        .route(
            "/user/totp/disable",
            Endpoint::new(disable_totp(totp, service, state.rate_limiter.clone(), engine.clone()), disable).form(),
        )
        .route_layer(axum_middleware::from_fn_with_state(state.clone(), require_user))
}

/// Build the public router: website pages, login and recovery access
pub fn build_public_router(state: &AppState) -> Router<AppState> {
    let engine = &state.engine;
    let config = &state.config;
    let users = &state.user_service;
    let totp = SqlxTotpRepository::boxed(state.pool.clone());
    let accesses = SqlxRecoveryAccessRepository::boxed(state.pool.clone());
    let user_repo = SqlxUserRepository::boxed(state.pool.clone());

    let home = RouteDefaults::new().template("index.html");
    let login_defaults = RouteDefaults::new().route("/").template("login.html");
    let recovery = RouteDefaults::new().template("recovery/request.html");

    Router::new()
        .route("/", Endpoint::new(static_content(engine.clone()), home.clone()).get())
        .route("/p/{*name}", Endpoint::new(static_content(engine.clone()), home).get())
        .route(
            "/content/{slug}",
            Endpoint::new(
                dynamic_content(
                    SqlxContentRepository::boxed(state.pool.clone()),
                    SqlxContentTypeRepository::boxed(state.pool.clone()),
                    engine.clone(),
                ),
                RouteDefaults::new(),
            )
            .get(),
        )
        .route(
            "/media/{id}",
            Endpoint::new(
                render_media(SqlxMediaRepository::boxed(state.pool.clone()), config.media.path.clone(), engine.clone()),
                RouteDefaults::new(),
            )
            .get(),
        )
        .route(
            "/assets/{kind}/{set}",
            Endpoint::new(
                minifier(Arc::new(config.assets.clone()), state.asset_cache.clone(), engine.clone()),
                RouteDefaults::new(),
            )
            .get(),
        )
        .route(
            "/login",
            Endpoint::new(
                login(users.clone(), totp, state.rate_limiter.clone(), &config.security, engine.clone()),
                login_defaults,
            )
            .form(),
        )
        .route(
            "/logout",
            Endpoint::new(logout(users.clone(), engine.clone()), RouteDefaults::new().route("/")).post(),
        )
        .route(
            "/recovery",
            Endpoint::new(
                prepare_recovery_access(
                    user_repo.clone(),
                    accesses.clone(),
                    state.notifier.clone(),
                    &config.security,
                    &config.server.base_url,
                    engine.clone(),
                ),
                recovery,
            )
            .form(),
        )
        .route(
            "/recovery/access",
            Endpoint::new(
                recovery_access(users.clone(), user_repo, accesses, &config.security, engine.clone()),
                RouteDefaults::new(),
            )
            .get(),
        )
}

/// Build the complete router with middleware
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.media.max_file_size as usize + BODY_LIMIT_MARGIN;

    Router::new()
        .merge(build_public_router(&state))
        .merge(build_user_router(&state))
        .merge(build_admin_router(&state))
        .layer(axum_middleware::from_fn_with_state(state.clone(), load_session))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

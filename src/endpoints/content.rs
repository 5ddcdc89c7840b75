//! Pages of the public website

use std::sync::Arc;

use crate::db::repositories::ContentRepository;
use crate::models::ContentType;
use crate::object::Loader;
use crate::recipe::Recipe;
use crate::steps::{ExtractSlug, LoadPublishedContent, Render, RenderError, ResolveContentTemplate, ResolveStaticTemplate};
use crate::templating::TemplateEngine;

/// Template page: `pages/{name}.html`, or the `template` of the route
pub fn static_content(engine: Arc<TemplateEngine>) -> Recipe {
    Recipe::new("static_content")
        .cook(ResolveStaticTemplate::new(engine.clone()), "resolve_template", 10)
        .cook(Render::from_ingredient(engine.clone()), "render", 20)
        .on_error(RenderError::new(engine))
}

/// Published content found by slug, rendered with the template of its type
pub fn dynamic_content(
    contents: Arc<dyn ContentRepository>,
    types: Arc<dyn Loader<ContentType>>,
    engine: Arc<TemplateEngine>,
) -> Recipe {
    Recipe::new("dynamic_content")
        .cook(ExtractSlug, "extract_slug", 10)
        .cook(LoadPublishedContent::new(contents), "load_content", 20)
        .cook(ResolveContentTemplate::new(types), "resolve_template", 30)
        .cook(Render::from_ingredient(engine.clone()), "render", 40)
        .on_error(RenderError::new(engine))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxContentRepository, SqlxContentTypeRepository};
    use crate::http::{RouteDefaults, ServerRequest};
    use crate::models::Content;
    use crate::object::Writer;
    use crate::recipe::keys;
    use crate::steps::testing::{answer, engine, pool, workplan};
    use axum::http::StatusCode;
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn test_static_page() {
        let request = ServerRequest::get("/p/about").with_param("name", "about");
        let workplan = static_content(engine()).execute(workplan(request)).await;
        assert_eq!(answer(&workplan).body_text(), "about");
    }

    #[tokio::test]
    async fn test_home_page_from_route_template() {
        let mut workplan = workplan(ServerRequest::get("/"));
        RouteDefaults::new().template("pages/about.html").apply(&mut workplan);
        let workplan = static_content(engine()).execute(workplan).await;
        assert_eq!(answer(&workplan).status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_static_page() {
        let request = ServerRequest::get("/p/nope").with_param("name", "nope");
        let workplan = static_content(engine()).execute(workplan(request)).await;
        assert_eq!(answer(&workplan).status, StatusCode::NOT_FOUND);
        assert_eq!(answer(&workplan).body_text(), "error 404: Page not found");
    }

    #[tokio::test]
    async fn test_dynamic_content() {
        let pool = pool().await;
        let contents = SqlxContentRepository::boxed(pool.clone());
        let mut content = Content::new("Welcome");
        content.slug = "welcome".to_string();
        content.published_at = Some(Utc::now() - Duration::minutes(1));
        contents.save(&mut content).await.unwrap();

        let recipe = dynamic_content(contents, SqlxContentTypeRepository::boxed(pool), engine());
        let request = ServerRequest::get("/content/welcome");
        let workplan = recipe.execute(workplan(request).with(keys::SLUG, "welcome".to_string())).await;

        assert_eq!(answer(&workplan).status, StatusCode::OK);
        assert_eq!(answer(&workplan).body_text(), "Welcome");
    }

    #[tokio::test]
    async fn test_dynamic_content_not_found() {
        let pool = pool().await;
        let recipe = dynamic_content(
            SqlxContentRepository::boxed(pool.clone()),
            SqlxContentTypeRepository::boxed(pool),
            engine(),
        );
        let workplan = recipe.execute(workplan(ServerRequest::get("/content/missing"))).await;
        assert_eq!(answer(&workplan).status, StatusCode::NOT_FOUND);
    }
}

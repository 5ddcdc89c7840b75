//! Dynamic and static content steps

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

use crate::db::repositories::ContentRepository;
use crate::http::ServerRequest;
use crate::models::{Content, ContentType, DEFAULT_CONTENT_TEMPLATE};
use crate::object::{is_slug, Loader};
use crate::recipe::{keys, Flow, Step, StepError, Workplan};
use crate::templating::TemplateEngine;

static PAGE_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9_\-/]+$").expect("valid page name pattern"));

/// Put the requested slug in the `slug` ingredient
///
/// Endpoints seed the `{slug}` route parameter already; otherwise the last
/// segment of the path is used. Malformed slugs cannot match any content.
pub struct ExtractSlug;

#[async_trait]
impl Step for ExtractSlug {
    async fn cook(&self, workplan: &mut Workplan) -> Result<Flow, StepError> {
        let slug = match workplan.get::<String>(keys::SLUG) {
            Some(slug) => slug.clone(),
            None => {
                let request = workplan.require::<ServerRequest>(keys::REQUEST)?;
                request
                    .param("slug")
                    .map(str::to_string)
                    .or_else(|| request.path.trim_end_matches('/').rsplit('/').next().map(str::to_string))
                    .unwrap_or_default()
            }
        };

        if !is_slug(&slug) {
            return Err(StepError::not_found(format!("No content at '{}'", slug)));
        }

        workplan.insert(keys::SLUG, slug);
        Ok(Flow::Continue)
    }
}

/// Load the published content matching `slug`
pub struct LoadPublishedContent {
    contents: Arc<dyn ContentRepository>,
}

impl LoadPublishedContent {
    pub fn new(contents: Arc<dyn ContentRepository>) -> Self {
        Self { contents }
    }
}

#[async_trait]
impl Step for LoadPublishedContent {
    async fn cook(&self, workplan: &mut Workplan) -> Result<Flow, StepError> {
        let slug = workplan.require::<String>(keys::SLUG)?;

        let content = self
            .contents
            .find_published_by_slug(slug)
            .await?
            .ok_or_else(|| StepError::not_found(format!("No content at '{}'", slug)))?;

        workplan.add_view_parameter("content", &content)?;
        workplan.insert(keys::OBJECT, content);
        Ok(Flow::Continue)
    }
}

/// Pick the template of the loaded content from its type
///
/// Contents without a type, or whose type is gone, use `content.html`.
/// The parts of the content are exposed by block name under `parts`.
pub struct ResolveContentTemplate {
    types: Arc<dyn Loader<ContentType>>,
}

impl ResolveContentTemplate {
    pub fn new(types: Arc<dyn Loader<ContentType>>) -> Self {
        Self { types }
    }
}

#[async_trait]
impl Step for ResolveContentTemplate {
    async fn cook(&self, workplan: &mut Workplan) -> Result<Flow, StepError> {
        let content = workplan.require::<Content>(keys::OBJECT)?;
        let parts = content.parts.clone();

        let content_type = match content.type_id {
            Some(type_id) => self.types.load(type_id).await?,
            None => None,
        };
        let template = content_type
            .as_ref()
            .map(|content_type| content_type.template.clone())
            .filter(|template| !template.is_empty())
            .unwrap_or_else(|| DEFAULT_CONTENT_TEMPLATE.to_string());

        workplan.add_view_parameter("content_type", &content_type)?;
        workplan.add_view_parameter("parts", &parts)?;
        workplan.insert(keys::TEMPLATE, template);
        Ok(Flow::Continue)
    }
}

/// Pick the template of a static page
///
/// The `{name}` route parameter maps to `pages/{name}.html`; names are
/// limited to lowercase letters, digits, `_`, `-` and `/`. Without a name
/// the `template` ingredient of the route is kept. Either way the template
/// has to exist.
pub struct ResolveStaticTemplate {
    engine: Arc<TemplateEngine>,
}

impl ResolveStaticTemplate {
    pub fn new(engine: Arc<TemplateEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Step for ResolveStaticTemplate {
    async fn cook(&self, workplan: &mut Workplan) -> Result<Flow, StepError> {
        let name = workplan
            .get::<ServerRequest>(keys::REQUEST)
            .and_then(|request| request.param("name"))
            .map(str::to_string);

        let template = match name {
            Some(name) => {
                if !PAGE_NAME.is_match(&name) || name.contains("//") || name.starts_with('/') {
                    return Err(StepError::not_found(format!("No page named '{}'", name)));
                }
                workplan.add_view_parameter("page", &name)?;
                format!("pages/{}.html", name)
            }
            None => workplan.require::<String>(keys::TEMPLATE)?.clone(),
        };

        if !self.engine.exists(&template) {
            return Err(StepError::not_found("Page not found"));
        }

        workplan.insert(keys::TEMPLATE, template);
        Ok(Flow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxContentRepository, SqlxContentTypeRepository};
    use crate::object::Writer;
    use crate::steps::testing::{engine, pool, workplan};
    use axum::http::StatusCode;
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn test_extract_slug_from_path() {
        let mut workplan = workplan(ServerRequest::get("/content/hello-world/"));
        ExtractSlug.cook(&mut workplan).await.unwrap();
        assert_eq!(workplan.get::<String>(keys::SLUG).unwrap(), "hello-world");
    }

    #[tokio::test]
    async fn test_extract_slug_accepts_generated_slugs() {
        for title in ["Café ٣", "コーヒー", "हिंदी"] {
            let slug = crate::object::generate_slug(title);
            let mut workplan = workplan(ServerRequest::get("/content/x")).with(keys::SLUG, slug.clone());
            ExtractSlug.cook(&mut workplan).await.unwrap();
            assert_eq!(workplan.get::<String>(keys::SLUG), Some(&slug));
        }
    }

    #[tokio::test]
    async fn test_extract_slug_rejects_malformed() {
        let mut workplan = workplan(ServerRequest::get("/content/x")).with(keys::SLUG, "../secret".to_string());
        let error = ExtractSlug.cook(&mut workplan).await.unwrap_err();
        assert_eq!(error.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_published_content_with_type_template() {
        let pool = pool().await;
        let contents = SqlxContentRepository::boxed(pool.clone());
        let types = SqlxContentTypeRepository::boxed(pool);

        let mut content_type = ContentType {
            name: "Page".to_string(),
            template: "page.html".to_string(),
            ..ContentType::default()
        };
        types.save(&mut content_type).await.unwrap();

        let mut content = Content::new("About");
        content.slug = "about".to_string();
        content.type_id = Some(content_type.id);
        content.parts.insert("main".to_string(), "<p>Hi</p>".to_string());
        content.published_at = Some(Utc::now() - Duration::hours(1));
        contents.save(&mut content).await.unwrap();

        let mut workplan = workplan(ServerRequest::get("/content/about")).with(keys::SLUG, "about".to_string());
        LoadPublishedContent::new(contents).cook(&mut workplan).await.unwrap();
        ResolveContentTemplate::new(types).cook(&mut workplan).await.unwrap();

        assert_eq!(workplan.get::<String>(keys::TEMPLATE).unwrap(), "page.html");
        assert_eq!(workplan.view()["content"]["title"], "About");
        assert_eq!(workplan.view()["parts"]["main"], "<p>Hi</p>");
    }

    #[tokio::test]
    async fn test_unpublished_content_is_not_found() {
        let pool = pool().await;
        let contents = SqlxContentRepository::boxed(pool);
        let mut content = Content::new("Draft");
        content.slug = "draft".to_string();
        contents.save(&mut content).await.unwrap();

        let mut workplan = Workplan::new().with(keys::SLUG, "draft".to_string());
        let error = LoadPublishedContent::new(contents).cook(&mut workplan).await.unwrap_err();
        assert_eq!(error.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_content_without_type_uses_default_template() {
        let types = SqlxContentTypeRepository::boxed(pool().await);
        let mut workplan = Workplan::new().with(keys::OBJECT, Content::new("Untyped"));

        ResolveContentTemplate::new(types).cook(&mut workplan).await.unwrap();
        assert_eq!(workplan.get::<String>(keys::TEMPLATE).unwrap(), DEFAULT_CONTENT_TEMPLATE);
    }

    #[tokio::test]
    async fn test_static_page_by_name() {
        let mut workplan = workplan(ServerRequest::get("/p/about").with_param("name", "about"));
        ResolveStaticTemplate::new(engine()).cook(&mut workplan).await.unwrap();
        assert_eq!(workplan.get::<String>(keys::TEMPLATE).unwrap(), "pages/about.html");
    }

    #[tokio::test]
    async fn test_static_page_rejects_traversal_and_unknown() {
        for name in ["../error", "About", "missing", "/etc"] {
            let mut workplan = workplan(ServerRequest::get("/p/x").with_param("name", name));
            let error = ResolveStaticTemplate::new(engine()).cook(&mut workplan).await.unwrap_err();
            assert_eq!(error.status(), StatusCode::NOT_FOUND, "{}", name);
        }
    }

    #[tokio::test]
    async fn test_static_page_from_route_template() {
        let mut workplan = workplan(ServerRequest::get("/")).with(keys::TEMPLATE, "content.html".to_string());
        ResolveStaticTemplate::new(engine()).cook(&mut workplan).await.unwrap();
        assert_eq!(workplan.get::<String>(keys::TEMPLATE).unwrap(), "content.html");
    }
}

//! Template engine
//!
//! Tera templates. The default templates are embedded in the binary; any
//! `.html` file found in the override directory replaces the embedded
//! template with the same relative name (or adds a new one, which is how
//! static pages are published).

use rust_embed::RustEmbed;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::fs;
use std::path::Path;
use tera::{Context as TeraContext, Tera};

mod error;

pub use error::TemplateError;

/// Default templates shipped with the website
#[derive(RustEmbed)]
#[folder = "templates/"]
#[include = "*.html"]
struct DefaultTemplates;

/// Renders pages from view parameters
pub struct TemplateEngine {
    tera: Tera,
    /// Variables available to every template
    globals: Map<String, Value>,
}

impl std::fmt::Debug for TemplateEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateEngine")
            .field("templates", &self.tera.get_template_names().count())
            .finish()
    }
}

impl TemplateEngine {
    /// Embedded templates, overridden by the ones found in `override_path`
    pub fn new(override_path: &Path) -> Result<Self, TemplateError> {
        let mut templates = embedded_templates()?;

        let mut overrides = Vec::new();
        collect_templates_from_dir(override_path, override_path, &mut overrides)?;
        if !overrides.is_empty() {
            tracing::info!("Loaded {} templates from {}", overrides.len(), override_path.display());
        }
        templates.extend(overrides);

        Self::from_templates(templates)
    }

    /// Embedded templates only
    pub fn embedded() -> Result<Self, TemplateError> {
        Self::from_templates(embedded_templates()?)
    }

    /// Engine over the given `(name, source)` templates
    pub fn from_templates<I>(templates: I) -> Result<Self, TemplateError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut tera = Tera::default();
        tera.autoescape_on(vec![".html"]);
        tera.add_raw_templates(templates)
            .map_err(|e| TemplateError::Load(describe(&e)))?;

        Ok(Self {
            tera,
            globals: Map::new(),
        })
    }

    /// Add a variable to every render
    pub fn with_global(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.globals.insert(name.to_string(), value.into());
        self
    }

    pub fn exists(&self, template: &str) -> bool {
        self.tera.get_template_names().any(|name| name == template)
    }

    pub fn template_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tera.get_template_names().collect();
        names.sort_unstable();
        names
    }

    /// Render `template`; view parameters shadow the globals
    pub fn render(&self, template: &str, view: &Map<String, Value>) -> Result<String, TemplateError> {
        if !self.exists(template) {
            return Err(TemplateError::NotFound(template.to_string()));
        }

        let mut parameters = self.globals.clone();
        for (name, value) in view {
            parameters.insert(name.clone(), value.clone());
        }
        let context = TeraContext::from_value(Value::Object(parameters))
            .map_err(|e| TemplateError::Render(describe(&e)))?;

        self.tera
            .render(template, &context)
            .map_err(|e| TemplateError::Render(format!("'{}': {}", template, describe(&e))))
    }
}

fn embedded_templates() -> Result<BTreeMap<String, String>, TemplateError> {
    let mut templates = BTreeMap::new();
    for name in DefaultTemplates::iter() {
        let file = DefaultTemplates::get(&name).ok_or_else(|| TemplateError::NotFound(name.to_string()))?;
        let source = String::from_utf8(file.data.into_owned())
            .map_err(|_| TemplateError::Load(format!("Template {} is not valid UTF-8", name)))?;
        templates.insert(name.to_string(), source);
    }
    Ok(templates)
}

/// Collect `.html` templates below `current_path`, named relative to `base_path`
fn collect_templates_from_dir(
    base_path: &Path,
    current_path: &Path,
    templates: &mut Vec<(String, String)>,
) -> Result<(), TemplateError> {
    if !current_path.is_dir() {
        return Ok(());
    }

    for entry in fs::read_dir(current_path)? {
        let path = entry?.path();

        if path.is_dir() {
            collect_templates_from_dir(base_path, &path, templates)?;
        } else if path.extension().map_or(false, |ext| ext == "html") {
            let relative_path = path
                .strip_prefix(base_path)
                .map_err(|_| TemplateError::Load(format!("Unexpected template path {}", path.display())))?;
            let name = relative_path.to_string_lossy().replace('\\', "/");
            templates.push((name, fs::read_to_string(&path)?));
        }
    }

    Ok(())
}

/// Tera errors hide the useful part in their sources
fn describe(error: &tera::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(&format!("\n  Caused by: {}", cause));
        source = cause.source();
    }
    message
}

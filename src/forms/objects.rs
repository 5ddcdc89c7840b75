//! Administration forms of the CRUD objects

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{fields, Form, FormErrors, ObjectForm};
use crate::models::{Category, Content, ContentType, Item, Media, User, UserRole, DEFAULT_CONTENT_TEMPLATE};
use crate::object::is_slug;
use crate::services::password::MIN_PASSWORD_LENGTH;

const MAX_TITLE_LENGTH: usize = 255;

static TEMPLATE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9_\-]+(?:/[a-z0-9_\-]+)*\.html$").expect("valid template pattern"));

fn check_slug(errors: &mut FormErrors, slug: &str) {
    let slug = normalize_slug(slug);
    errors.check(
        slug.is_empty() || is_slug(&slug),
        "slug",
        "Slug may only contain letters, digits and single dashes",
    );
}

fn check_title(errors: &mut FormErrors, field: &str, value: &str) {
    errors.check(!value.trim().is_empty(), field, "This field is required");
    errors.check(
        value.chars().count() <= MAX_TITLE_LENGTH,
        field,
        format!("At most {} characters", MAX_TITLE_LENGTH),
    );
}

fn normalize_slug(slug: &str) -> String {
    slug.trim().to_lowercase()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentForm {
    #[serde(default, deserialize_with = "fields::optional_number")]
    pub type_id: Option<i64>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub subtitle: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parts: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "fields::list")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "fields::optional_datetime")]
    pub published_at: Option<DateTime<Utc>>,
}

impl Form for ContentForm {
    fn validate(&self) -> FormErrors {
        let mut errors = FormErrors::new();
        check_title(&mut errors, "title", &self.title);
        check_slug(&mut errors, &self.slug);
        errors
    }
}

impl ObjectForm<Content> for ContentForm {
    fn from_object(content: &Content) -> Self {
        Self {
            type_id: content.type_id,
            title: content.title.clone(),
            subtitle: content.subtitle.clone(),
            slug: content.slug.clone(),
            description: content.description.clone(),
            parts: content.parts.clone(),
            tags: content.tags.clone(),
            published_at: content.published_at,
        }
    }

    fn apply(&self, content: &mut Content) {
        content.type_id = self.type_id;
        content.title = self.title.trim().to_string();
        content.subtitle = self.subtitle.trim().to_string();
        content.slug = normalize_slug(&self.slug);
        content.description = self.description.clone();
        content.parts = self.parts.clone();
        content.tags = self.tags.clone();
        content.published_at = self.published_at;
        content.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentTypeForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub template: String,
    #[serde(default, deserialize_with = "fields::list")]
    pub blocks: Vec<String>,
}

impl Form for ContentTypeForm {
    fn validate(&self) -> FormErrors {
        let mut errors = FormErrors::new();
        check_title(&mut errors, "name", &self.name);
        let template = self.template.trim();
        errors.check(
            template.is_empty() || TEMPLATE_PATTERN.is_match(template),
            "template",
            "Template must be a relative .html path",
        );
        errors
    }
}

impl ObjectForm<ContentType> for ContentTypeForm {
    fn from_object(content_type: &ContentType) -> Self {
        Self {
            name: content_type.name.clone(),
            template: content_type.template.clone(),
            blocks: content_type.blocks.clone(),
        }
    }

    fn apply(&self, content_type: &mut ContentType) {
        content_type.name = self.name.trim().to_string();
        content_type.template = match self.template.trim() {
            "" => DEFAULT_CONTENT_TEMPLATE.to_string(),
            template => template.to_string(),
        };
        content_type.blocks = self.blocks.clone();
        content_type.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub location: String,
    #[serde(default, deserialize_with = "fields::flag")]
    pub hidden: bool,
    #[serde(default, deserialize_with = "fields::optional_number")]
    pub parent_id: Option<i64>,
}

impl Form for CategoryForm {
    fn validate(&self) -> FormErrors {
        let mut errors = FormErrors::new();
        check_title(&mut errors, "name", &self.name);
        check_slug(&mut errors, &self.slug);
        errors
    }
}

impl ObjectForm<Category> for CategoryForm {
    fn from_object(category: &Category) -> Self {
        Self {
            name: category.name.clone(),
            slug: category.slug.clone(),
            location: category.location.clone(),
            hidden: category.hidden,
            parent_id: category.parent_id,
        }
    }

    fn apply(&self, category: &mut Category) {
        category.name = self.name.trim().to_string();
        category.slug = normalize_slug(&self.slug);
        category.location = self.location.trim().to_string();
        category.hidden = self.hidden;
        category.parent_id = self.parent_id.filter(|parent| *parent != category.id);
        category.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub location: String,
    #[serde(default, deserialize_with = "fields::number")]
    pub position: i64,
    #[serde(default, deserialize_with = "fields::flag")]
    pub hidden: bool,
    #[serde(default, deserialize_with = "fields::optional_number")]
    pub content_id: Option<i64>,
    #[serde(default, deserialize_with = "fields::optional_number")]
    pub parent_id: Option<i64>,
}

impl Form for ItemForm {
    fn validate(&self) -> FormErrors {
        let mut errors = FormErrors::new();
        check_title(&mut errors, "name", &self.name);
        check_slug(&mut errors, &self.slug);
        errors.check(!self.location.trim().is_empty(), "location", "This field is required");
        errors
    }
}

impl ObjectForm<Item> for ItemForm {
    fn from_object(item: &Item) -> Self {
        Self {
            name: item.name.clone(),
            slug: item.slug.clone(),
            location: item.location.clone(),
            position: item.position,
            hidden: item.hidden,
            content_id: item.content_id,
            parent_id: item.parent_id,
        }
    }

    fn apply(&self, item: &mut Item) {
        item.name = self.name.trim().to_string();
        item.slug = normalize_slug(&self.slug);
        item.location = self.location.trim().to_string();
        item.position = self.position;
        item.hidden = self.hidden;
        item.content_id = self.content_id;
        item.parent_id = self.parent_id.filter(|parent| *parent != item.id);
        item.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default, deserialize_with = "fields::flag")]
    pub active: bool,
    #[serde(default, deserialize_with = "fields::flag")]
    pub admin: bool,
    /// Left empty to keep the current password
    #[serde(default, skip_serializing, deserialize_with = "fields::optional_text")]
    pub password: Option<String>,
}

impl Form for UserForm {
    fn validate(&self) -> FormErrors {
        let mut errors = FormErrors::new();
        let email = self.email.trim();
        errors.check(
            email.split_once('@').map_or(false, |(local, domain)| !local.is_empty() && domain.contains('.')),
            "email",
            "A valid email address is required",
        );
        if let Some(password) = &self.password {
            errors.check(
                password.chars().count() >= MIN_PASSWORD_LENGTH,
                "password",
                format!("At least {} characters", MIN_PASSWORD_LENGTH),
            );
        }
        errors
    }
}

impl ObjectForm<User> for UserForm {
    fn from_object(user: &User) -> Self {
        Self {
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            active: user.active,
            admin: user.is_admin(),
            password: None,
        }
    }

    fn apply(&self, user: &mut User) {
        user.email = self.email.trim().to_string();
        user.first_name = self.first_name.trim().to_string();
        user.last_name = self.last_name.trim().to_string();
        user.active = self.active;
        user.roles = if self.admin {
            vec![UserRole::User, UserRole::Admin]
        } else {
            vec![UserRole::User]
        };
        user.new_password = self.password.clone();
        user.updated_at = Utc::now();
    }
}

/// Metadata of a media; the file itself comes with the upload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaForm {
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "fields::optional_text")]
    pub alternative: Option<String>,
}

impl Form for MediaForm {}

impl ObjectForm<Media> for MediaForm {
    fn from_object(media: &Media) -> Self {
        Self {
            name: media.name.clone(),
            alternative: media.alternative.clone(),
        }
    }

    fn apply(&self, media: &mut Media) {
        let name = self.name.trim();
        if !name.is_empty() {
            media.name = name.to_string();
        }
        media.alternative = self.alternative.clone();
        media.updated_at = Utc::now();
    }
}

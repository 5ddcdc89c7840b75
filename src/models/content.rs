//! Content model
//!
//! A content is a publishable page. Its body is split into named parts
//! (one per block declared by its [`super::ContentType`]), rendered by the
//! type's template.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::object::{Object, Publishable, Sluggable};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub id: i64,
    /// Content type deciding which template renders the content
    pub type_id: Option<i64>,
    pub title: String,
    pub subtitle: String,
    pub slug: String,
    pub description: String,
    /// Block name -> HTML fragment
    pub parts: BTreeMap<String, String>,
    pub tags: Vec<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for Content {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            type_id: None,
            title: String::new(),
            subtitle: String::new(),
            slug: String::new(),
            description: String::new(),
            parts: BTreeMap::new(),
            tags: Vec::new(),
            published_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Content {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Tags as stored in the database (comma separated)
    pub fn tags_column(&self) -> String {
        self.tags.join(",")
    }

    pub fn parse_tags(column: &str) -> Vec<String> {
        column
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }
}

impl Object for Content {
    const KIND: &'static str = "content";
    const SORTABLE_COLUMNS: &'static [&'static str] =
        &["id", "title", "slug", "published_at", "created_at", "updated_at"];
    const DEFAULT_ORDER: &'static str = "title";

    fn id(&self) -> i64 {
        self.id
    }
}

impl Sluggable for Content {
    fn slug_source(&self) -> String {
        self.title.clone()
    }

    fn slug(&self) -> &str {
        &self.slug
    }

    fn set_slug(&mut self, slug: String) {
        self.slug = slug;
    }
}

impl Publishable for Content {
    fn published_at(&self) -> Option<DateTime<Utc>> {
        self.published_at
    }

    fn set_published_at(&mut self, at: Option<DateTime<Utc>>) {
        self.published_at = at;
    }
}

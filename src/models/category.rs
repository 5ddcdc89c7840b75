//! Category model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::object::{Object, Sluggable};

/// Category grouping contents, optionally nested
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub slug: String,
    /// Where the category is displayed (e.g. "top", "footer")
    pub location: String,
    pub hidden: bool,
    pub parent_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for Category {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            name: String::new(),
            slug: String::new(),
            location: String::new(),
            hidden: false,
            parent_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Object for Category {
    const KIND: &'static str = "category";
    const SORTABLE_COLUMNS: &'static [&'static str] = &["id", "name", "slug", "location", "created_at"];
    const DEFAULT_ORDER: &'static str = "name";

    fn id(&self) -> i64 {
        self.id
    }
}

impl Sluggable for Category {
    fn slug_source(&self) -> String {
        self.name.clone()
    }

    fn slug(&self) -> &str {
        &self.slug
    }

    fn set_slug(&mut self, slug: String) {
        self.slug = slug;
    }
}

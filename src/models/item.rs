//! Menu item model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::object::{Object, Sluggable};

/// Entry of a navigation menu, pointing at a content or standing alone
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub name: String,
    pub slug: String,
    /// Menu the item belongs to (e.g. "top", "footer")
    pub location: String,
    /// Rank inside its menu, lower first
    pub position: i64,
    pub hidden: bool,
    pub content_id: Option<i64>,
    pub parent_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for Item {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            name: String::new(),
            slug: String::new(),
            location: String::new(),
            position: 0,
            hidden: false,
            content_id: None,
            parent_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Object for Item {
    const KIND: &'static str = "item";
    const SORTABLE_COLUMNS: &'static [&'static str] =
        &["id", "name", "slug", "location", "position", "created_at"];
    const DEFAULT_ORDER: &'static str = "position";

    fn id(&self) -> i64 {
        self.id
    }
}

impl Sluggable for Item {
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

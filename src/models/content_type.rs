//! Content type model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::object::Object;

/// Describes how a family of contents is rendered
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentType {
    pub id: i64,
    pub name: String,
    /// Template used to render contents of this type
    pub template: String,
    /// Names of the parts a content of this type is made of
    pub blocks: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for ContentType {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            name: String::new(),
            template: DEFAULT_CONTENT_TEMPLATE.to_string(),
            blocks: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Template used for contents without a type
pub const DEFAULT_CONTENT_TEMPLATE: &str = "content.html";

impl Object for ContentType {
    const KIND: &'static str = "type";
    const SORTABLE_COLUMNS: &'static [&'static str] = &["id", "name", "template", "created_at"];
    const DEFAULT_ORDER: &'static str = "name";

    fn id(&self) -> i64 {
        self.id
    }
}

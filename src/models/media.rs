//! Media model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::object::Object;

/// Uploaded file served by the media endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Media {
    pub id: i64,
    /// Original file name
    pub name: String,
    pub mime_type: String,
    /// Size in bytes
    pub length: i64,
    /// Alternative text for images
    pub alternative: Option<String>,
    /// File name inside the media directory
    #[serde(skip_serializing)]
    pub local_path: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for Media {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            name: String::new(),
            mime_type: "application/octet-stream".to_string(),
            length: 0,
            alternative: None,
            local_path: String::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

impl Object for Media {
    const KIND: &'static str = "media";
    const SORTABLE_COLUMNS: &'static [&'static str] = &["id", "name", "mime_type", "length", "created_at"];
    const DEFAULT_ORDER: &'static str = "created_at";

    fn id(&self) -> i64 {
        self.id
    }
}

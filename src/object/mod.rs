//! Object contracts shared by models, repositories and steps
//!
//! Every persisted model implements [`Object`]. Repositories expose them
//! through [`Loader`] and [`Writer`], which is all the generic CRUD steps
//! need to know about storage.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A persisted domain object
pub trait Object: Clone + Default + Serialize + Send + Sync + 'static {
    /// Short machine name, used in logs and error messages
    const KIND: &'static str;

    /// Columns accepted by listing order clauses
    const SORTABLE_COLUMNS: &'static [&'static str];

    /// Column used when the request does not ask for an order
    const DEFAULT_ORDER: &'static str = "id";

    /// Database identifier, `0` until the object has been saved
    fn id(&self) -> i64;

    fn is_new(&self) -> bool {
        self.id() == 0
    }
}

/// Objects addressed by a URL slug
pub trait Sluggable: Object {
    /// Text the slug is derived from when none was given
    fn slug_source(&self) -> String;

    fn slug(&self) -> &str;

    fn set_slug(&mut self, slug: String);
}

/// Objects that are only visible once published
pub trait Publishable: Object {
    fn published_at(&self) -> Option<DateTime<Utc>>;

    fn set_published_at(&mut self, at: Option<DateTime<Utc>>);

    fn is_published(&self) -> bool {
        self.published_at().map_or(false, |at| at <= Utc::now())
    }
}

/// Read access to a kind of object
#[async_trait]
pub trait Loader<T: Object>: Send + Sync {
    async fn load(&self, id: i64) -> Result<Option<T>>;

    async fn query(&self, query: &ListQuery) -> Result<PagedResult<T>>;
}

/// Write access to a kind of object
#[async_trait]
pub trait Writer<T: Object>: Send + Sync {
    /// Insert a new object (setting its id) or update an existing one
    async fn save(&self, object: &mut T) -> Result<()>;

    async fn remove(&self, object: &T) -> Result<()>;
}

/// Slug uniqueness lookups
#[async_trait]
pub trait SlugFinder: Send + Sync {
    /// Whether `slug` is already used by an object other than `exclude_id`
    async fn slug_exists(&self, slug: &str, exclude_id: i64) -> Result<bool>;
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    #[default]
    #[serde(alias = "asc")]
    Asc,
    #[serde(alias = "desc")]
    Desc,
}

impl Direction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for Direction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ASC" => Ok(Self::Asc),
            "DESC" => Ok(Self::Desc),
            _ => Err(anyhow::anyhow!("Invalid order direction: {}", s)),
        }
    }
}

/// Order clause for listings; the column is always one of the object's
/// sortable columns
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Order {
    pub column: String,
    pub direction: Direction,
}

impl Order {
    pub fn new(column: impl Into<String>, direction: Direction) -> Self {
        Self {
            column: column.into(),
            direction,
        }
    }
}

/// Pagination parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListParams {
    /// Page number (1-indexed)
    pub page: u32,
    pub per_page: u32,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 15,
        }
    }
}

impl ListParams {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, 100),
        }
    }

    /// Calculate the offset for database queries
    pub fn offset(&self) -> i64 {
        (self.page.saturating_sub(1) as i64) * self.per_page as i64
    }

    pub fn limit(&self) -> i64 {
        self.per_page as i64
    }
}

/// Everything a listing query needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub params: ListParams,
    pub order: Order,
}

/// Paginated result container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    /// Total number of items across all pages
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

impl<T> PagedResult<T> {
    pub fn new(items: Vec<T>, total: i64, params: &ListParams) -> Self {
        Self {
            items,
            total,
            page: params.page,
            per_page: params.per_page,
        }
    }

    pub fn total_pages(&self) -> u32 {
        if self.per_page == 0 {
            return 0;
        }
        let total = self.total.max(0) as u64;
        ((total + self.per_page as u64 - 1) / self.per_page as u64) as u32
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages()
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }
}

impl<T> Default for PagedResult<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
            page: 1,
            per_page: 15,
        }
    }
}

/// Build a URL slug from arbitrary text
///
/// Lowercases, replaces separators and ASCII punctuation with hyphens,
/// collapses repeated hyphens and trims them from both ends. Non-ASCII
/// letters are kept as they are.
pub fn generate_slug(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut prev_hyphen = false;

    for c in text.to_lowercase().chars() {
        let c = if c.is_ascii_alphanumeric() || (!c.is_ascii() && c.is_alphanumeric()) {
            c
        } else {
            '-'
        };

        if c == '-' {
            if !prev_hyphen && !result.is_empty() {
                result.push(c);
                prev_hyphen = true;
            }
        } else {
            result.push(c);
            prev_hyphen = false;
        }
    }

    while result.ends_with('-') {
        result.pop();
    }

    result
}

/// Whether `text` is a slug as [`generate_slug`] writes them
///
/// Forms, slug preparation and content lookup all accept exactly the
/// strings that [`generate_slug`] leaves unchanged.
pub fn is_slug(text: &str) -> bool {
    !text.is_empty() && generate_slug(text) == text
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_generate_slug_simple() {
        assert_eq!(generate_slug("Hello World"), "hello-world");
    }

    #[test]
    fn test_generate_slug_with_punctuation() {
        assert_eq!(generate_slug("Hello, World!"), "hello-world");
        assert_eq!(generate_slug("  --Leading and trailing--  "), "leading-and-trailing");
    }

    #[test]
    fn test_generate_slug_keeps_unicode_letters() {
        assert_eq!(generate_slug("Café Crème"), "café-crème");
    }

    #[test]
    fn test_generate_slug_empty() {
        assert_eq!(generate_slug("!!!"), "");
    }

    #[test]
    fn test_generated_slugs_are_slugs() {
        for title in ["Café", "コーヒー", "हिंदी", "Café ٣", "Hello World"] {
            let slug = generate_slug(title);
            assert!(is_slug(&slug), "{:?} from {:?}", slug, title);
        }
    }

    #[test]
    fn test_is_slug_rejects_malformed() {
        assert!(!is_slug(""));
        assert!(!is_slug("About-Us"));
        assert!(!is_slug("not a slug"));
        assert!(!is_slug("-leading"));
        assert!(!is_slug("double--dash"));
        assert!(!is_slug("../etc"));
    }

    #[test]
    fn test_list_params_clamps() {
        let params = ListParams::new(0, 500);
        assert_eq!(params.page, 1);
        assert_eq!(params.per_page, 100);
        assert_eq!(params.offset(), 0);

        let params = ListParams::new(3, 10);
        assert_eq!(params.offset(), 20);
        assert_eq!(params.limit(), 10);
    }

    #[test]
    fn test_paged_result_navigation() {
        let result: PagedResult<i32> = PagedResult::new(vec![1, 2], 12, &ListParams::new(2, 5));
        assert_eq!(result.total_pages(), 3);
        assert!(result.has_next());
        assert!(result.has_prev());

        let empty: PagedResult<i32> = PagedResult::new(vec![], 0, &ListParams::new(1, 5));
        assert_eq!(empty.total_pages(), 0);
        assert!(!empty.has_next());
    }

    #[test]
    fn test_direction_parsing() {
        assert_eq!("desc".parse::<Direction>().unwrap(), Direction::Desc);
        assert_eq!("ASC".parse::<Direction>().unwrap(), Direction::Asc);
        assert!("sideways".parse::<Direction>().is_err());
        assert_eq!(serde_json::to_string(&Direction::Desc).unwrap(), "\"DESC\"");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn slug_is_trimmed_and_has_no_double_hyphen(text in ".{0,40}") {
            let slug = generate_slug(&text);
            prop_assert!(!slug.starts_with('-'));
            prop_assert!(!slug.ends_with('-'));
            prop_assert!(!slug.contains("--"));
            prop_assert!(!slug.chars().any(|c| c.is_ascii_uppercase() || c.is_whitespace()));
        }

        #[test]
        fn slug_is_idempotent(text in ".{0,40}") {
            let slug = generate_slug(&text);
            prop_assert_eq!(generate_slug(&slug), slug.clone());
        }

        #[test]
        fn list_params_offset_matches_page(page in 1u32..1000, per_page in 1u32..=100) {
            let params = ListParams::new(page, per_page);
            prop_assert_eq!(params.offset(), ((page - 1) * per_page) as i64);
        }
    }
}

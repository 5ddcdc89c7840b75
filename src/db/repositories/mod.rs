//! Database repositories
//!
//! One repository per persisted model. Repositories of CRUD-managed objects
//! implement [`Loader`](crate::object::Loader) and
//! [`Writer`](crate::object::Writer); sluggable ones also implement
//! [`SlugFinder`](crate::object::SlugFinder).

pub mod category;
pub mod content;
pub mod content_type;
pub mod item;
pub mod media;
pub mod recovery;
pub mod session;
pub mod totp;
pub mod user;

pub use category::SqlxCategoryRepository;
pub use content::{ContentRepository, SqlxContentRepository};
pub use content_type::SqlxContentTypeRepository;
pub use item::SqlxItemRepository;
pub use media::SqlxMediaRepository;
pub use recovery::{RecoveryAccessRepository, SqlxRecoveryAccessRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use totp::{SqlxTotpRepository, TotpRepository};
pub use user::{SqlxUserRepository, UserRepository};

use anyhow::{Context, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::object::{ListQuery, PagedResult};

/// Run a paged listing query on `table`
///
/// The order column is checked against `sortable` again so a caller cannot
/// smuggle arbitrary SQL into the ORDER BY clause; unknown columns fall back
/// to `id`.
pub(crate) async fn fetch_page<T, F>(
    pool: &SqlitePool,
    table: &str,
    columns: &str,
    sortable: &[&str],
    query: &ListQuery,
    map: F,
) -> Result<PagedResult<T>>
where
    F: Fn(&SqliteRow) -> Result<T>,
{
    let column = if sortable.contains(&query.order.column.as_str()) {
        query.order.column.as_str()
    } else {
        "id"
    };

    let total: i64 = sqlx::query(&format!("SELECT COUNT(*) AS count FROM {}", table))
        .fetch_one(pool)
        .await
        .with_context(|| format!("Failed to count {}", table))?
        .get("count");

    let sql = format!(
        "SELECT {} FROM {} ORDER BY {} {}, id ASC LIMIT ? OFFSET ?",
        columns,
        table,
        column,
        query.order.direction.as_sql()
    );
    let rows = sqlx::query(&sql)
        .bind(query.params.limit())
        .bind(query.params.offset())
        .fetch_all(pool)
        .await
        .with_context(|| format!("Failed to list {}", table))?;

    let items = rows.iter().map(map).collect::<Result<Vec<_>>>()?;
    Ok(PagedResult::new(items, total, &query.params))
}

/// Whether `slug` is used in `table` by a row other than `exclude_id`
pub(crate) async fn slug_exists(pool: &SqlitePool, table: &str, slug: &str, exclude_id: i64) -> Result<bool> {
    let row = sqlx::query(&format!(
        "SELECT COUNT(*) AS count FROM {} WHERE slug = ? AND id != ?",
        table
    ))
    .bind(slug)
    .bind(exclude_id)
    .fetch_one(pool)
    .await
    .with_context(|| format!("Failed to check slug in {}", table))?;
    Ok(row.get::<i64, _>("count") > 0)
}

pub(crate) async fn delete_by_id(pool: &SqlitePool, table: &str, id: i64) -> Result<()> {
    sqlx::query(&format!("DELETE FROM {} WHERE id = ?", table))
        .bind(id)
        .execute(pool)
        .await
        .with_context(|| format!("Failed to delete from {}", table))?;
    Ok(())
}

//! Database layer
//!
//! SQLite through sqlx: a connection pool, embedded migrations and one
//! repository per persisted model.
//!
//! ```ignore
//! use east_website::config::DatabaseConfig;
//! use east_website::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{create_pool, create_test_pool, ping};

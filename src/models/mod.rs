//! Data models
//!
//! Persisted entities of the website:
//! - Publishable contents and their types
//! - Categories and menu items
//! - Media files
//! - Users with their sessions and credentials (password, TOTP, recovery access)

mod category;
mod content;
mod content_type;
mod item;
mod media;
mod recovery;
mod session;
mod totp;
mod user;

pub use category::Category;
pub use content::Content;
pub use content_type::{ContentType, DEFAULT_CONTENT_TEMPLATE};
pub use item::Item;
pub use media::Media;
pub use recovery::RecoveryAccess;
pub use session::{Session, SessionStage};
pub use totp::{TotpAlgorithm, TotpAuth};
pub use user::{StoredPassword, User, UserRole};

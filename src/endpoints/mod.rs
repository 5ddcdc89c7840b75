//! Endpoints
//!
//! Each function assembles the [`Recipe`](crate::recipe::Recipe) of one kind
//! of endpoint from steps. Route specific values (`route`, `template`, page
//! size...) are not part of the recipe: they come from the
//! [`RouteDefaults`](crate::http::RouteDefaults) the recipe is mounted with.
//! Every recipe renders its failures with `RenderError`.

pub mod account;
pub mod content;
pub mod crud;
pub mod media;
pub mod minifier;
pub mod totp;

pub use account::{change_password, login, login_totp_check, logout, prepare_recovery_access, recovery_access};
pub use content::{dynamic_content, static_content};
pub use crud::{create_object, delete_object, edit_object, list_objects, slug_steps};
pub use media::{media_file_removal, render_media, upload_media};
pub use minifier::{build_asset, minifier, minify_command};
pub use totp::{disable_totp, enable_totp, totp_status, validate_totp};

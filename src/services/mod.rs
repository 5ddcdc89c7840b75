//! Services layer
//!
//! Logic the steps delegate to:
//! - Password hashing and user sessions
//! - Login attempt limits
//! - TOTP second factor
//! - Recovery access notifications
//! - Asset minification

pub mod email;
pub mod minifier;
pub mod password;
pub mod rate_limiter;
pub mod totp;
pub mod user;

pub use email::{notifier, LogNotifier, RecoveryNotifier, SmtpNotifier};
pub use password::{hash_password, verify_password};
pub use rate_limiter::LoginRateLimiter;
pub use totp::TotpService;
pub use user::{
    generate_recovery_token, hash_recovery_token, AuthenticatedUser, UserService, UserServiceError,
    DEFAULT_SESSION_EXPIRATION_DAYS,
};

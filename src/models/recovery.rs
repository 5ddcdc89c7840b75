//! Recovery access model

use chrono::{DateTime, Utc};

/// One-time access granted to a user who lost their credentials
///
/// Only the SHA-256 digest of the token is stored; the token itself is sent
/// to the user and never persisted.
#[derive(Debug, Clone)]
pub struct RecoveryAccess {
    pub user_id: i64,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl RecoveryAccess {
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }
}

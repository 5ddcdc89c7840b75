//! TOTP second factor of a user

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// HMAC algorithm used to derive codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TotpAlgorithm {
    #[default]
    Sha1,
    Sha256,
    Sha512,
}

impl fmt::Display for TotpAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sha1 => write!(f, "sha1"),
            Self::Sha256 => write!(f, "sha256"),
            Self::Sha512 => write!(f, "sha512"),
        }
    }
}

impl FromStr for TotpAlgorithm {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sha1" => Ok(Self::Sha1),
            "sha256" => Ok(Self::Sha256),
            "sha512" => Ok(Self::Sha512),
            _ => Err(anyhow::anyhow!("Invalid TOTP algorithm: {}", s)),
        }
    }
}

/// TOTP configuration attached to a user
///
/// Created disabled when the user starts enrolling; enabled once a first
/// code has been validated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TotpAuth {
    pub user_id: i64,
    /// Authenticator application family, informative only
    pub provider: String,
    /// Base32 encoded shared secret
    #[serde(skip_serializing)]
    pub secret: String,
    pub algorithm: TotpAlgorithm,
    pub period: u64,
    pub digits: u32,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

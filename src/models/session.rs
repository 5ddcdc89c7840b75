//! Session model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How far a session got through authentication
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStage {
    /// Fully authenticated
    Full,
    /// Password accepted, second factor still expected
    TotpPending,
    /// Opened from a recovery link, only allowed to change the password
    Recovery,
}

impl fmt::Display for SessionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::TotpPending => write!(f, "totp_pending"),
            Self::Recovery => write!(f, "recovery"),
        }
    }
}

impl FromStr for SessionStage {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(Self::Full),
            "totp_pending" => Ok(Self::TotpPending),
            "recovery" => Ok(Self::Recovery),
            _ => Err(anyhow::anyhow!("Invalid session stage: {}", s)),
        }
    }
}

/// Session entity for user authentication
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Session ID (token)
    pub id: String,
    pub user_id: i64,
    pub stage: SessionStage,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_session_expiry() {
        let now = Utc::now();
        let mut session = Session {
            id: "token".to_string(),
            user_id: 1,
            stage: SessionStage::Full,
            expires_at: now + Duration::hours(1),
            created_at: now,
        };
        assert!(!session.is_expired());
        session.expires_at = now - Duration::seconds(1);
        assert!(session.is_expired());
    }

    #[test]
    fn test_stage_roundtrip() {
        for stage in [SessionStage::Full, SessionStage::TotpPending, SessionStage::Recovery] {
            assert_eq!(stage.to_string().parse::<SessionStage>().unwrap(), stage);
        }
        assert!("half".parse::<SessionStage>().is_err());
    }
}

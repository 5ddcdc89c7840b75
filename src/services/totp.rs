//! TOTP (RFC 6238) second factor
//!
//! Secrets are 160-bit random values stored base32 encoded. Codes are checked
//! with a skew of one period on each side.

use anyhow::{anyhow, Result};
use chrono::Utc;
use totp_rs::{Algorithm, Secret, TOTP};

use crate::config::SecurityConfig;
use crate::models::{TotpAlgorithm, TotpAuth};

/// Accepted clock drift, in periods
const SKEW: u8 = 1;

/// Provider name recorded for secrets created here
pub const DEFAULT_PROVIDER: &str = "generic";

/// Builds, shares and checks TOTP configurations
#[derive(Debug, Clone)]
pub struct TotpService {
    issuer: String,
    digits: u32,
    period: u64,
}

impl TotpService {
    pub fn new(issuer: impl Into<String>, digits: u32, period: u64) -> Self {
        Self {
            issuer: issuer.into(),
            digits,
            period,
        }
    }

    pub fn from_config(config: &SecurityConfig) -> Self {
        Self::new(config.totp_issuer.clone(), config.totp_digits, config.totp_period)
    }

    /// Fresh, disabled configuration with a new random secret
    pub fn generate(&self, user_id: i64) -> TotpAuth {
        TotpAuth {
            user_id,
            provider: DEFAULT_PROVIDER.to_string(),
            secret: Secret::generate_secret().to_encoded().to_string(),
            algorithm: TotpAlgorithm::Sha1,
            period: self.period,
            digits: self.digits,
            enabled: false,
            created_at: Utc::now(),
        }
    }

    fn build(&self, auth: &TotpAuth, account: &str) -> Result<TOTP> {
        let secret = Secret::Encoded(auth.secret.clone())
            .to_bytes()
            .map_err(|e| anyhow!("Invalid TOTP secret: {}", e))?;
        let algorithm = match auth.algorithm {
            TotpAlgorithm::Sha1 => Algorithm::SHA1,
            TotpAlgorithm::Sha256 => Algorithm::SHA256,
            TotpAlgorithm::Sha512 => Algorithm::SHA512,
        };

        TOTP::new(
            algorithm,
            auth.digits as usize,
            SKEW,
            auth.period,
            secret,
            Some(self.issuer.clone()),
            account.replace(':', "_"),
        )
        .map_err(|e| anyhow!("Invalid TOTP configuration: {}", e))
    }

    /// `otpauth://` URL to enroll an authenticator application
    pub fn provisioning_url(&self, auth: &TotpAuth, account: &str) -> Result<String> {
        Ok(self.build(auth, account)?.get_url())
    }

    /// Base64 PNG QR code of the provisioning URL
    pub fn qr_code(&self, auth: &TotpAuth, account: &str) -> Result<String> {
        self.build(auth, account)?
            .get_qr_base64()
            .map_err(|e| anyhow!("Failed to render QR code: {}", e))
    }

    /// Whether `code` is valid right now
    pub fn verify(&self, auth: &TotpAuth, code: &str) -> Result<bool> {
        let code: String = code.chars().filter(|c| !c.is_whitespace()).collect();
        if code.len() != auth.digits as usize || !code.chars().all(|c| c.is_ascii_digit()) {
            return Ok(false);
        }

        self.build(auth, "check")?
            .check_current(&code)
            .map_err(|e| anyhow!("System clock error: {}", e))
    }

    /// Code valid right now
    pub fn current_code(&self, auth: &TotpAuth) -> Result<String> {
        self.build(auth, "check")?
            .generate_current()
            .map_err(|e| anyhow!("System clock error: {}", e))
    }
}

//! Recovery access notifications
//!
//! Users who lost their credentials receive a one-time link by email. When
//! no SMTP server is configured the link is only written to the log, which
//! is enough for development setups.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials, AsyncSmtpTransport,
    AsyncTransport, Message, Tokio1Executor,
};
use std::sync::Arc;

use crate::config::SmtpConfig;
use crate::models::User;

/// Sends recovery links to users
#[async_trait]
pub trait RecoveryNotifier: Send + Sync {
    async fn notify(&self, user: &User, link: &str) -> Result<()>;
}

/// Pick the notifier matching the configuration
pub fn notifier(smtp: Option<&SmtpConfig>, site_name: &str) -> Arc<dyn RecoveryNotifier> {
    match smtp {
        Some(config) if !config.host.is_empty() => Arc::new(SmtpNotifier::new(config.clone(), site_name)),
        _ => Arc::new(LogNotifier),
    }
}

/// Delivers notifications through an SMTP relay
pub struct SmtpNotifier {
    config: SmtpConfig,
    site_name: String,
}

impl SmtpNotifier {
    pub fn new(config: SmtpConfig, site_name: impl Into<String>) -> Self {
        Self {
            config,
            site_name: site_name.into(),
        }
    }

    fn build_message(&self, user: &User, link: &str) -> Result<Message> {
        let from = format!("{} <{}>", self.config.from_name, self.config.from);
        let subject = format!("[{}] Access recovery", self.site_name);

        Message::builder()
            .from(from.parse().map_err(|e| anyhow!("Invalid from address: {}", e))?)
            .to(user.email.parse().map_err(|e| anyhow!("Invalid to address: {}", e))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(recovery_body(user, link, &self.site_name))
            .map_err(|e| anyhow!("Failed to build email: {}", e))
    }
}

#[async_trait]
impl RecoveryNotifier for SmtpNotifier {
    async fn notify(&self, user: &User, link: &str) -> Result<()> {
        let email = self.build_message(user, link)?;

        let credentials = Credentials::new(self.config.username.clone(), self.config.password.clone());
        let mailer: AsyncSmtpTransport<Tokio1Executor> =
            AsyncSmtpTransport::<Tokio1Executor>::relay(&self.config.host)
                .map_err(|e| anyhow!("Failed to create SMTP transport: {}", e))?
                .credentials(credentials)
                .port(self.config.port)
                .build();

        mailer
            .send(email)
            .await
            .map_err(|e| anyhow!("Failed to send email: {}", e))?;

        tracing::info!("Recovery access sent to user {}", user.id);
        Ok(())
    }
}

/// Writes the recovery link to the log instead of sending it
pub struct LogNotifier;

#[async_trait]
impl RecoveryNotifier for LogNotifier {
    async fn notify(&self, user: &User, link: &str) -> Result<()> {
        tracing::warn!(
            "SMTP is not configured; recovery link for {}: {}",
            user.email,
            link
        );
        Ok(())
    }
}

fn recovery_body(user: &User, link: &str, site_name: &str) -> String {
    format!(
        "Hello {},\n\n\
         Someone (hopefully you) asked to recover the access to your account.\n\
         Follow this link to choose a new password:\n\n{}\n\n\
         The link can be used once and expires soon. If you did not ask for it, ignore this email.\n\n\
         {}",
        user.display_name(),
        link,
        site_name
    )
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Keeps notifications in memory
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub sent: Mutex<Vec<(String, String)>>,
    }

    impl RecordingNotifier {
        pub fn last_link(&self) -> Option<String> {
            self.sent.lock().unwrap().last().map(|(_, link)| link.clone())
        }
    }

    #[async_trait]
    impl RecoveryNotifier for RecordingNotifier {
        async fn notify(&self, user: &User, link: &str) -> Result<()> {
            self.sent.lock().unwrap().push((user.email.clone(), link.to_string()));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn smtp_config() -> SmtpConfig {
        SmtpConfig {
            host: "smtp.example.com".to_string(),
            port: 587,
            username: "mailer".to_string(),
            password: "secret".to_string(),
            from: "noreply@example.com".to_string(),
            from_name: "East Website".to_string(),
        }
    }

    #[test]
    fn test_recovery_body_contains_link() {
        let user = User::new("jane@example.com", "Jane", "Doe");
        let body = recovery_body(&user, "https://example.com/recovery/access?token=abc", "East");
        assert!(body.contains("Hello Jane Doe"));
        assert!(body.contains("https://example.com/recovery/access?token=abc"));
    }

    #[test]
    fn test_build_message() {
        let notifier = SmtpNotifier::new(smtp_config(), "East");
        let user = User::new("jane@example.com", "", "");
        assert!(notifier.build_message(&user, "https://example.com").is_ok());

        let invalid = User::new("not an address", "", "");
        assert!(notifier.build_message(&invalid, "https://example.com").is_err());
    }

    #[tokio::test]
    async fn test_log_notifier_always_succeeds() {
        let user = User::new("jane@example.com", "", "");
        assert!(LogNotifier.notify(&user, "https://example.com").await.is_ok());
    }

    #[test]
    fn test_notifier_falls_back_to_log() {
        let mut config = smtp_config();
        config.host.clear();
        // Only checks selection does not panic without a usable host
        let _ = notifier(Some(&config), "East");
        let _ = notifier(None, "East");
    }
}

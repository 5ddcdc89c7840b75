//! Account forms: login, second factor, recovery and password change

use serde::{Deserialize, Serialize};

use super::{Form, FormErrors};
use crate::services::password::MIN_PASSWORD_LENGTH;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing)]
    pub password: String,
}

impl Form for LoginForm {
    fn validate(&self) -> FormErrors {
        let mut errors = FormErrors::new();
        errors.check(!self.email.trim().is_empty(), "email", "This field is required");
        errors.check(!self.password.is_empty(), "password", "This field is required");
        errors
    }
}

/// Code displayed by an authenticator application
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TotpCodeForm {
    #[serde(default, skip_serializing)]
    pub code: String,
}

impl TotpCodeForm {
    pub fn code(&self) -> String {
        self.code.chars().filter(|c| !c.is_whitespace()).collect()
    }
}

impl Form for TotpCodeForm {
    fn validate(&self) -> FormErrors {
        let mut errors = FormErrors::new();
        let code = self.code();
        errors.check(
            (6..=8).contains(&code.len()) && code.chars().all(|c| c.is_ascii_digit()),
            "code",
            "Enter the code shown by your authenticator application",
        );
        errors
    }
}

/// Address a recovery link is requested for
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecoveryForm {
    #[serde(default)]
    pub email: String,
}

impl Form for RecoveryForm {
    fn validate(&self) -> FormErrors {
        let mut errors = FormErrors::new();
        errors.check(self.email.contains('@'), "email", "A valid email address is required");
        errors
    }
}

/// New password, typed twice
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PasswordForm {
    #[serde(default, skip_serializing)]
    pub password: String,
    #[serde(default, skip_serializing)]
    pub confirmation: String,
}

impl Form for PasswordForm {
    fn validate(&self) -> FormErrors {
        let mut errors = FormErrors::new();
        errors.check(
            self.password.chars().count() >= MIN_PASSWORD_LENGTH,
            "password",
            format!("At least {} characters", MIN_PASSWORD_LENGTH),
        );
        errors.check(
            self.password == self.confirmation,
            "confirmation",
            "Passwords do not match",
        );
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forms::FormState;
    use serde_json::json;

    #[test]
    fn test_login_form_requires_both_fields() {
        let state = FormState::<LoginForm>::submit(&json!({"email": "a@example.com"}));
        assert_eq!(state.errors.get("password").len(), 1);
        assert!(state.errors.get("email").is_empty());
    }

    #[test]
    fn test_login_form_hides_password_from_view() {
        let state = FormState::<LoginForm>::submit(&json!({"email": "a@example.com", "password": "secret-pass"}));
        assert!(state.is_valid());
        assert!(!state.view().to_string().contains("secret-pass"));
    }

    #[test]
    fn test_totp_code_form() {
        let state = FormState::<TotpCodeForm>::submit(&json!({"code": "123 456"}));
        assert!(state.is_valid());
        assert_eq!(state.form.code(), "123456");

        for code in ["12345", "abcdef", ""] {
            let state = FormState::<TotpCodeForm>::submit(&json!({ "code": code }));
            assert!(!state.is_valid(), "{} should be rejected", code);
        }
    }

    #[test]
    fn test_password_form() {
        let state = FormState::<PasswordForm>::submit(&json!({"password": "long-enough", "confirmation": "long-enough"}));
        assert!(state.is_valid());

        let state = FormState::<PasswordForm>::submit(&json!({"password": "short", "confirmation": "other"}));
        assert_eq!(state.errors.get("password").len(), 1);
        assert_eq!(state.errors.get("confirmation").len(), 1);
    }

    #[test]
    fn test_recovery_form() {
        assert!(FormState::<RecoveryForm>::submit(&json!({"email": "a@example.com"})).is_valid());
        assert!(!FormState::<RecoveryForm>::submit(&json!({"email": "nobody"})).is_valid());
    }
}

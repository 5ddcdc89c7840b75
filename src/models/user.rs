//! User model
//!
//! A user is identified by its email address. Credentials are not stored on
//! the user itself: the password hash lives in [`StoredPassword`] and the
//! second factor in [`super::TotpAuth`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::object::Object;

/// User entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    /// Email address (unique, used to log in)
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub roles: Vec<UserRole>,
    /// Inactive users cannot log in
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Plaintext password waiting to be hashed by the writer
    #[serde(skip)]
    pub new_password: Option<String>,
}

impl Default for User {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            email: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            roles: vec![UserRole::User],
            active: true,
            created_at: now,
            updated_at: now,
            new_password: None,
        }
    }
}

impl User {
    pub fn new(email: impl Into<String>, first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            ..Self::default()
        }
    }

    pub fn with_role(mut self, role: UserRole) -> Self {
        if !self.roles.contains(&role) {
            self.roles.push(role);
        }
        self
    }

    pub fn is_admin(&self) -> bool {
        self.roles.contains(&UserRole::Admin)
    }

    pub fn display_name(&self) -> String {
        let name = format!("{} {}", self.first_name, self.last_name);
        let name = name.trim();
        if name.is_empty() {
            self.email.clone()
        } else {
            name.to_string()
        }
    }

    /// Roles as stored in the database (comma separated)
    pub fn roles_column(&self) -> String {
        self.roles.iter().map(|r| r.to_string()).collect::<Vec<_>>().join(",")
    }

    /// Parse the stored roles column, ignoring unknown entries
    pub fn parse_roles(column: &str) -> Vec<UserRole> {
        column
            .split(',')
            .filter_map(|r| r.trim().parse().ok())
            .collect()
    }
}

impl Object for User {
    const KIND: &'static str = "user";
    const SORTABLE_COLUMNS: &'static [&'static str] =
        &["id", "email", "first_name", "last_name", "created_at", "updated_at"];
    const DEFAULT_ORDER: &'static str = "email";

    fn id(&self) -> i64 {
        self.id
    }
}

/// User role for authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Full access to the administration area
    Admin,
    /// Can manage their own account
    User,
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::Admin => write!(f, "admin"),
            UserRole::User => write!(f, "user"),
        }
    }
}

impl FromStr for UserRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" | "role_admin" => Ok(UserRole::Admin),
            "user" | "role_user" => Ok(UserRole::User),
            _ => Err(anyhow::anyhow!("Invalid user role: {}", s)),
        }
    }
}

/// Argon2 password hash of a user
#[derive(Debug, Clone)]
pub struct StoredPassword {
    pub user_id: i64,
    /// PHC string
    pub hash: String,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_new_defaults() {
        let user = User::new("jane@example.com", "Jane", "Doe");
        assert_eq!(user.id, 0);
        assert!(user.is_new());
        assert!(user.active);
        assert_eq!(user.roles, vec![UserRole::User]);
        assert!(!user.is_admin());
    }

    #[test]
    fn test_user_with_role() {
        let user = User::new("a@example.com", "", "").with_role(UserRole::Admin).with_role(UserRole::Admin);
        assert!(user.is_admin());
        assert_eq!(user.roles.len(), 2);
    }

    #[test]
    fn test_display_name_falls_back_to_email() {
        assert_eq!(User::new("a@example.com", "", "").display_name(), "a@example.com");
        assert_eq!(User::new("a@example.com", "Ada", "Lovelace").display_name(), "Ada Lovelace");
    }

    #[test]
    fn test_roles_column_roundtrip() {
        let user = User::new("a@example.com", "", "").with_role(UserRole::Admin);
        assert_eq!(user.roles_column(), "user,admin");
        assert_eq!(User::parse_roles("user, admin, bogus"), vec![UserRole::User, UserRole::Admin]);
    }

    #[test]
    fn test_user_role_from_str() {
        assert_eq!(UserRole::from_str("ADMIN").unwrap(), UserRole::Admin);
        assert_eq!(UserRole::from_str("ROLE_USER").unwrap(), UserRole::User);
        assert!(UserRole::from_str("invalid").is_err());
    }

    #[test]
    fn test_new_password_is_never_serialized() {
        let mut user = User::new("a@example.com", "", "");
        user.new_password = Some("secret".to_string());
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret"));
    }
}

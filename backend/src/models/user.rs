//! Models that represent user accounts, credentials payloads, and roles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::types::UserId;
use crate::validation::rules::validate_username;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
/// Database representation of a user account.
pub struct User {
    /// Unique identifier for the user.
    pub id: UserId,
    /// Immutable username used for login.
    pub username: String,
    /// Optional email address, unique when present.
    pub email: Option<String>,
    /// Argon2 hash of the user's password. `None` for SSO-only accounts.
    pub password_hash: Option<String>,
    /// Human-readable full name.
    pub full_name: String,
    /// Role describing the user's privileges.
    pub role: UserRole,
    /// Creation timestamp for auditing.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp for auditing.
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
/// Supported user roles stored in the database.
pub enum UserRole {
    /// Standard member role with limited permissions.
    #[default]
    Member,
    /// Administrator role with elevated permissions.
    Admin,
}

impl UserRole {
    /// Returns the canonical snake_case representation of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Member => "member",
            UserRole::Admin => "admin",
        }
    }

    /// Scopes granted to sessions created for this role.
    pub fn default_scopes(&self) -> Vec<String> {
        let mut scopes = vec!["folders:read".to_string(), "folders:write".to_string()];
        if matches!(self, UserRole::Admin) {
            scopes.push("apps:manage".to_string());
        }
        scopes
    }
}

impl User {
    /// Constructs a new user with freshly generated identifiers.
    pub fn new(
        username: String,
        email: Option<String>,
        password_hash: Option<String>,
        full_name: String,
        role: UserRole,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: UserId::new(),
            username,
            email,
            password_hash,
            full_name,
            role,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns `true` when the user holds the `Admin` role.
    pub fn is_admin(&self) -> bool {
        matches!(self.role, UserRole::Admin)
    }
}

#[derive(Debug, Deserialize, Validate)]
/// Payload for creating a new account with a password.
pub struct SignupRequest {
    #[validate(custom(function = "validate_username"))]
    pub username: String,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 8))]
    pub password: String,
    #[serde(default)]
    pub full_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
/// Credentials submitted by a user attempting to authenticate.
pub struct LoginRequest {
    /// Username or email address.
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
/// Authentication tokens returned after a successful login.
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserResponse,
}

#[derive(Debug, Serialize, Deserialize)]
/// Public-facing representation of a user returned by the API.
pub struct UserResponse {
    pub id: UserId,
    pub username: String,
    pub email: Option<String>,
    pub full_name: String,
    pub role: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        UserResponse {
            id: user.id,
            username: user.username,
            email: user.email,
            full_name: user.full_name,
            role: user.role.as_str().to_string(),
        }
    }
}

/// Link between a local user and an external SSO identity.
#[derive(Debug, Clone, FromRow)]
pub struct IdentityLink {
    pub id: String,
    pub user_id: UserId,
    pub provider: String,
    pub provider_subject: String,
    pub created_at: DateTime<Utc>,
}

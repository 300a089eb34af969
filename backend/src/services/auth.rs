//! Signup and password login, delegating session issuance to the session
//! manager.

use std::sync::Arc;

use validator::Validate;

use crate::error::{AppError, AuthError};
use crate::models::user::{SignupRequest, User, UserRole};
use crate::repositories::UserStore;
use crate::services::session::{IssuedSession, SessionService};
use crate::utils::password::{hash_password, verify_password};

pub struct AuthService {
    users: Arc<dyn UserStore>,
    sessions: Arc<SessionService>,
    /// Hash verified against when the account lookup misses, so the failure
    /// path costs the same as a real mismatch.
    dummy_hash: String,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserStore>, sessions: Arc<SessionService>) -> anyhow::Result<Self> {
        let dummy_hash = hash_password("unused-placeholder-credential")?;
        Ok(Self {
            users,
            sessions,
            dummy_hash,
        })
    }

    /// Creates a user account. Fails with `Conflict` on duplicate username
    /// or email, `Validation` on malformed input.
    pub async fn signup(&self, request: SignupRequest) -> Result<User, AppError> {
        request.validate()?;

        if self
            .users
            .find_by_username(&request.username)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict("Username already taken".to_string()));
        }
        if let Some(email) = &request.email {
            if self.users.find_by_email(email).await?.is_some() {
                return Err(AppError::Conflict("Email already registered".to_string()));
            }
        }

        let password_hash = hash_password(&request.password)?;
        let user = User::new(
            request.username,
            request.email,
            Some(password_hash),
            request.full_name.unwrap_or_default(),
            UserRole::Member,
        );
        self.users.insert(&user).await?;
        Ok(user)
    }

    /// Verifies credentials and creates a session. Every mismatch — unknown
    /// account, SSO-only account, wrong password — answers with the same
    /// `LoginInvalid`.
    pub async fn login(
        &self,
        identity: &str,
        password: &str,
    ) -> Result<(User, IssuedSession), AppError> {
        let user = self.users.find_by_username_or_email(identity).await?;

        let matches = match user.as_ref().and_then(|u| u.password_hash.as_deref()) {
            Some(hash) => verify_password(password, hash)?,
            None => {
                verify_password(password, &self.dummy_hash)?;
                false
            }
        };
        let user = match (user, matches) {
            (Some(user), true) => user,
            _ => return Err(AuthError::LoginInvalid.into()),
        };

        let issued = self.sessions.create_session(&user).await?;
        Ok((user, issued))
    }
}

//! Session lifecycle: creation, sliding/absolute expiry, refresh rotation,
//! and revocation.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::auth::token::{AccessClaims, TokenCodec};
use crate::auth::Subject;
use crate::error::{AppError, AuthError};
use crate::models::session::Session;
use crate::models::user::User;
use crate::repositories::SessionStore;
use crate::types::{SessionId, UserId};
use crate::utils::secret::{encode_composite, generate_secret, hash_secret, SECRET_LEN};

/// Sliding window from "now" capped by an absolute ceiling anchored to the
/// session's original creation time.
#[derive(Debug, Clone, Copy)]
pub struct ExpiryPolicy {
    pub sliding: Duration,
    pub absolute: Duration,
}

impl ExpiryPolicy {
    pub fn initial(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        std::cmp::min(now + self.sliding, now + self.absolute)
    }

    /// The ceiling stays anchored at creation so renewal cannot slide
    /// forever.
    pub fn renewed(&self, now: DateTime<Utc>, created_at: DateTime<Utc>) -> DateTime<Utc> {
        std::cmp::min(now + self.sliding, created_at + self.absolute)
    }
}

/// A freshly created or refreshed session with its credential pair.
#[derive(Debug)]
pub struct IssuedSession {
    pub session: Session,
    pub access_token: String,
    pub refresh_token: String,
}

pub struct SessionService {
    store: Arc<dyn SessionStore>,
    codec: Arc<TokenCodec>,
    policy: ExpiryPolicy,
    access_ttl: Duration,
}

impl SessionService {
    pub fn new(
        store: Arc<dyn SessionStore>,
        codec: Arc<TokenCodec>,
        policy: ExpiryPolicy,
        access_ttl: Duration,
    ) -> Self {
        Self {
            store,
            codec,
            policy,
            access_ttl,
        }
    }

    fn mint_access_token(&self, user: &User, session: &Session) -> Result<String, AppError> {
        let (token, _claims) = self.codec.sign_user(
            &user.id,
            &session.id,
            session.scopes.clone(),
            Some(user.role.as_str().to_string()),
            self.access_ttl,
        )?;
        Ok(token)
    }

    /// Creates a session for a freshly authenticated user and mints its
    /// access/refresh token pair.
    pub async fn create_session(&self, user: &User) -> Result<IssuedSession, AppError> {
        let secret = generate_secret(SECRET_LEN);
        let now = Utc::now();
        let session = Session {
            id: SessionId::new(),
            user_id: user.id.clone(),
            scopes: user.role.default_scopes(),
            secret_hash: hash_secret(&secret),
            created_at: now,
            updated_at: now,
            expires_at: self.policy.initial(now),
        };
        self.store.insert(&session).await?;

        let access_token = self.mint_access_token(user, &session)?;
        let refresh_token = encode_composite(&session.id, &secret);
        Ok(IssuedSession {
            session,
            access_token,
            refresh_token,
        })
    }

    /// Rotates the refresh secret and recomputes expiry. The update is
    /// conditioned on the secret hash the caller verified against, so of two
    /// racing refreshes exactly one wins; the loser fails with
    /// `SessionInvalid` and must re-authenticate.
    pub async fn extend_session(
        &self,
        session: &Session,
        user: &User,
    ) -> Result<IssuedSession, AppError> {
        let now = Utc::now();
        if session.is_expired(now) {
            return Err(AuthError::SessionExpired.into());
        }

        let secret = generate_secret(SECRET_LEN);
        let new_hash = hash_secret(&secret);
        let expires_at = self.policy.renewed(now, session.created_at);

        let rotated = self
            .store
            .rotate_secret(&session.id, &session.secret_hash, &new_hash, expires_at)
            .await?;
        if !rotated {
            return Err(AuthError::SessionInvalid.into());
        }

        let session = Session {
            secret_hash: new_hash,
            updated_at: now,
            expires_at,
            ..session.clone()
        };
        let access_token = self.mint_access_token(user, &session)?;
        let refresh_token = encode_composite(&session.id, &secret);
        Ok(IssuedSession {
            session,
            access_token,
            refresh_token,
        })
    }

    /// Proves possession of the refresh secret by hash equality against the
    /// stored session row.
    pub async fn verify_with_refresh_token(&self, token: &str) -> Result<Session, AppError> {
        let (id, secret) = crate::utils::secret::decode_composite(token)?;
        let session = self
            .store
            .find_by_id_and_hash(&id, &hash_secret(&secret))
            .await?
            .ok_or(AuthError::SessionInvalid)?;
        if session.is_expired(Utc::now()) {
            return Err(AuthError::SessionExpired.into());
        }
        Ok(session)
    }

    /// Binds a signed access token back to its revocable session record via
    /// the session id embedded in the `jti`. Deleting the session
    /// invalidates all access tokens derived from it.
    pub async fn verify_with_access_token(
        &self,
        claims: &AccessClaims,
    ) -> Result<Session, AppError> {
        let session_id = claims.session_id()?;
        let session = self
            .store
            .find_by_id(&session_id)
            .await?
            .ok_or(AuthError::SessionInvalid)?;
        if session.is_expired(Utc::now()) {
            return Err(AuthError::SessionExpired.into());
        }
        match claims.subject()? {
            Subject::User(user_id) if user_id == session.user_id => Ok(session),
            _ => Err(AuthError::SessionInvalid.into()),
        }
    }

    /// Deletes the session. Idempotent: an already-deleted session is not an
    /// error.
    pub async fn revoke(&self, id: &SessionId) -> Result<(), AppError> {
        let _deleted = self.store.delete(id).await?;
        Ok(())
    }

    pub async fn revoke_all_for_user(&self, user_id: &UserId) -> Result<u64, AppError> {
        Ok(self.store.delete_for_user(user_id).await?)
    }

    pub async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<Session>, AppError> {
        Ok(self.store.list_for_user(user_id).await?)
    }
}

//! Compact signed token minting and verification.
//!
//! First-party actor classes (users, application workers) are signed with
//! distinct process-wide HS256 secrets. Installed-application tokens are
//! verified against that application's stored RS256 public key; the codec
//! never holds application private keys.

use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::subject::Subject;
use crate::error::AuthError;
use crate::types::{SessionId, UserId};

/// Audience tag carried by every access token.
pub const AUDIENCE_ACCESS: &str = "access_token";

/// Separator between the originating session id and the unique suffix in a
/// user token's `jti`.
const JTI_SEPARATOR: char = '.';

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub aud: String,
    /// Unique token id. User-session tokens embed the originating session id
    /// as a prefix for traceability and revocation cross-checks.
    pub jti: String,
    /// Typed subject string, see [`Subject`].
    pub sub: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scp: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

impl AccessClaims {
    pub fn subject(&self) -> Result<Subject, AuthError> {
        Subject::parse(&self.sub)
    }

    /// Extracts the originating session id from the `jti` prefix.
    pub fn session_id(&self) -> Result<SessionId, AuthError> {
        let (session_part, _) = self
            .jti
            .split_once(JTI_SEPARATOR)
            .ok_or(AuthError::TokenInvalid)?;
        session_part.parse().map_err(|_| AuthError::TokenInvalid)
    }
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> AuthError {
    match err.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        _ => AuthError::TokenInvalid,
    }
}

fn strict_validation(algorithm: Algorithm) -> Validation {
    let mut validation = Validation::new(algorithm);
    validation.leeway = 0;
    validation.set_audience(&[AUDIENCE_ACCESS]);
    validation.set_required_spec_claims(&["exp", "aud"]);
    validation
}

/// Signs and verifies access tokens for all actor classes.
pub struct TokenCodec {
    user_encoding: EncodingKey,
    user_decoding: DecodingKey,
    worker_encoding: EncodingKey,
    worker_decoding: DecodingKey,
}

impl TokenCodec {
    pub fn new(user_secret: &str, worker_secret: &str) -> Self {
        Self {
            user_encoding: EncodingKey::from_secret(user_secret.as_ref()),
            user_decoding: DecodingKey::from_secret(user_secret.as_ref()),
            worker_encoding: EncodingKey::from_secret(worker_secret.as_ref()),
            worker_decoding: DecodingKey::from_secret(worker_secret.as_ref()),
        }
    }

    fn sign(
        &self,
        claims: &AccessClaims,
        encoding: &EncodingKey,
        decoding: &DecodingKey,
    ) -> anyhow::Result<String> {
        let token = encode(&Header::new(Algorithm::HS256), claims, encoding)?;
        // Round-trip before handing the token out: the codec never returns a
        // token it cannot itself validate.
        decode::<AccessClaims>(&token, decoding, &strict_validation(Algorithm::HS256))?;
        Ok(token)
    }

    /// Mints a user-session access token. The `jti` embeds the originating
    /// session id so verification can cross-check the live session record.
    pub fn sign_user(
        &self,
        user_id: &UserId,
        session_id: &SessionId,
        scopes: Vec<String>,
        role: Option<String>,
        ttl: Duration,
    ) -> anyhow::Result<(String, AccessClaims)> {
        let now = Utc::now();
        let claims = AccessClaims {
            aud: AUDIENCE_ACCESS.to_string(),
            jti: format!("{}{}{}", session_id, JTI_SEPARATOR, Uuid::new_v4()),
            sub: Subject::User(user_id.clone()).to_string(),
            scp: scopes,
            role,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        let token = self.sign(&claims, &self.user_encoding, &self.user_decoding)?;
        Ok((token, claims))
    }

    /// Mints a short-lived application-worker token.
    pub fn sign_worker(
        &self,
        application_identifier: &str,
        ttl: Duration,
    ) -> anyhow::Result<(String, AccessClaims)> {
        let now = Utc::now();
        let claims = AccessClaims {
            aud: AUDIENCE_ACCESS.to_string(),
            jti: Uuid::new_v4().to_string(),
            sub: Subject::AppWorker(application_identifier.to_string()).to_string(),
            scp: Vec::new(),
            role: None,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        let token = self.sign(&claims, &self.worker_encoding, &self.worker_decoding)?;
        Ok((token, claims))
    }

    /// Verifies a user-session access token. The subject must be a `USER:`
    /// subject; any other actor type fails with `TokenInvalid`.
    pub fn verify_user(&self, token: &str) -> Result<AccessClaims, AuthError> {
        let data = decode::<AccessClaims>(
            token,
            &self.user_decoding,
            &strict_validation(Algorithm::HS256),
        )
        .map_err(map_jwt_error)?;
        match data.claims.subject()? {
            Subject::User(_) => Ok(data.claims),
            _ => Err(AuthError::TokenInvalid),
        }
    }

    /// Verifies an application-worker token.
    pub fn verify_worker(&self, token: &str) -> Result<AccessClaims, AuthError> {
        let data = decode::<AccessClaims>(
            token,
            &self.worker_decoding,
            &strict_validation(Algorithm::HS256),
        )
        .map_err(map_jwt_error)?;
        match data.claims.subject()? {
            Subject::AppWorker(_) => Ok(data.claims),
            _ => Err(AuthError::TokenInvalid),
        }
    }

    /// Verifies an installed-application token against that application's
    /// stored public key.
    pub fn verify_app(
        &self,
        token: &str,
        public_key_pem: &str,
    ) -> Result<AccessClaims, AuthError> {
        let key = DecodingKey::from_rsa_pem(public_key_pem.as_bytes()).map_err(|err| {
            tracing::warn!(error = %err, "Stored application public key does not parse");
            AuthError::TokenInvalid
        })?;
        let data = decode::<AccessClaims>(token, &key, &strict_validation(Algorithm::RS256))
            .map_err(map_jwt_error)?;
        match data.claims.subject()? {
            Subject::App(_) => Ok(data.claims),
            _ => Err(AuthError::TokenInvalid),
        }
    }

    /// Parses a token's claims without verifying the signature or expiry.
    ///
    /// Used only to discover which actor type/key to verify against. The
    /// result is untrusted until a subsequent `verify_*` call succeeds.
    pub fn decode_unsafe(token: &str) -> Result<AccessClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256, Algorithm::RS256];
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();
        let data = decode::<AccessClaims>(token, &DecodingKey::from_secret(&[]), &validation)
            .map_err(|_| AuthError::MalformedToken)?;
        Ok(data.claims)
    }
}

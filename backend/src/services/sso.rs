//! Three-step SSO flow: initiate, provider callback, signup completion.
//!
//! The only state carried between callback and completion is a signed,
//! time-boxed username challenge, so an incomplete signup never touches the
//! session store.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::Config;
use crate::error::{AppError, AuthError};
use crate::models::user::{User, UserRole};
use crate::repositories::UserStore;
use crate::services::session::{IssuedSession, SessionService};
use crate::validation::rules::validate_username;

/// Audience tag for username-selection challenges.
const AUDIENCE_CHALLENGE: &str = "sso_challenge";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SsoProvider {
    Google,
    Github,
}

impl SsoProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            SsoProvider::Google => "google",
            SsoProvider::Github => "github",
        }
    }
}

impl fmt::Display for SsoProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SsoProvider {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "google" => Ok(SsoProvider::Google),
            "github" => Ok(SsoProvider::Github),
            other => Err(AppError::UnsupportedProvider(other.to_string())),
        }
    }
}

/// Profile returned by a provider after the code exchange.
#[derive(Debug, Clone)]
pub struct ProviderUserInfo {
    pub subject: String,
    pub email: Option<String>,
    pub suggested_username: String,
}

/// Exchange of an authorization code for the provider-side profile.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    async fn exchange_code(
        &self,
        provider: SsoProvider,
        code: &str,
        redirect_uri: &str,
    ) -> anyhow::Result<ProviderUserInfo>;
}

/// Claims of the signed username-selection challenge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeClaims {
    pub aud: String,
    pub provider: String,
    pub subject: String,
    pub email: Option<String>,
    pub suggested_username: String,
    pub iat: i64,
    pub exp: i64,
}

/// Result of a provider callback.
pub enum SsoOutcome {
    /// The provider identity is already linked to a local user.
    LoggedIn { user: User, issued: IssuedSession },
    /// New identity: the client must echo the challenge back with a chosen
    /// username.
    UsernameChallenge {
        challenge: String,
        suggested_username: String,
    },
}

pub struct SsoService {
    users: Arc<dyn UserStore>,
    sessions: Arc<SessionService>,
    provider_client: Arc<dyn ProviderClient>,
    challenge_encoding: EncodingKey,
    challenge_decoding: DecodingKey,
    challenge_ttl: Duration,
    config: Config,
}

impl SsoService {
    pub fn new(
        users: Arc<dyn UserStore>,
        sessions: Arc<SessionService>,
        provider_client: Arc<dyn ProviderClient>,
        config: Config,
    ) -> Self {
        Self {
            users,
            sessions,
            provider_client,
            challenge_encoding: EncodingKey::from_secret(config.sso_challenge_secret.as_ref()),
            challenge_decoding: DecodingKey::from_secret(config.sso_challenge_secret.as_ref()),
            challenge_ttl: Duration::minutes(config.sso_challenge_ttl_minutes as i64),
            config,
        }
    }

    fn redirect_uri(provider: SsoProvider, origin: &str) -> String {
        format!(
            "{}/api/auth/sso/{}/callback",
            origin.trim_end_matches('/'),
            provider
        )
    }

    fn client_id(&self, provider: SsoProvider) -> Result<&str, AppError> {
        let id = match provider {
            SsoProvider::Google => self.config.sso_google_client_id.as_deref(),
            SsoProvider::Github => self.config.sso_github_client_id.as_deref(),
        };
        id.ok_or_else(|| {
            AppError::BadRequest(format!("SSO provider {} is not configured", provider))
        })
    }

    /// Builds the provider authorization redirect URL.
    pub fn initiate(&self, provider: SsoProvider, origin: &str) -> Result<Url, AppError> {
        let client_id = self.client_id(provider)?;
        let redirect_uri = Self::redirect_uri(provider, origin);
        let url = match provider {
            SsoProvider::Google => Url::parse_with_params(
                "https://accounts.google.com/o/oauth2/v2/auth",
                &[
                    ("client_id", client_id),
                    ("redirect_uri", redirect_uri.as_str()),
                    ("response_type", "code"),
                    ("scope", "openid email profile"),
                ],
            ),
            SsoProvider::Github => Url::parse_with_params(
                "https://github.com/login/oauth/authorize",
                &[
                    ("client_id", client_id),
                    ("redirect_uri", redirect_uri.as_str()),
                    ("scope", "read:user user:email"),
                ],
            ),
        };
        url.map_err(|e| AppError::InternalServerError(e.into()))
    }

    /// Exchanges the provider code. A known identity link logs straight in;
    /// a new identity gets a signed username challenge.
    pub async fn handle_callback(
        &self,
        provider: SsoProvider,
        code: &str,
        origin: &str,
    ) -> Result<SsoOutcome, AppError> {
        let redirect_uri = Self::redirect_uri(provider, origin);
        let info = self
            .provider_client
            .exchange_code(provider, code, &redirect_uri)
            .await?;

        if let Some(link) = self
            .users
            .find_identity(provider.as_str(), &info.subject)
            .await?
        {
            let user = self.users.find_by_id(&link.user_id).await?.ok_or_else(|| {
                AppError::InternalServerError(anyhow::anyhow!(
                    "identity link points at missing user {}",
                    link.user_id
                ))
            })?;
            let issued = self.sessions.create_session(&user).await?;
            return Ok(SsoOutcome::LoggedIn { user, issued });
        }

        let suggested_username = info.suggested_username.clone();
        let challenge = self.sign_challenge(provider, &info)?;
        Ok(SsoOutcome::UsernameChallenge {
            challenge,
            suggested_username,
        })
    }

    /// Signs the challenge as a compact token. The payload travels inside
    /// the signed blob, so there is no serialize-order ambiguity to attack.
    pub fn sign_challenge(
        &self,
        provider: SsoProvider,
        info: &ProviderUserInfo,
    ) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = ChallengeClaims {
            aud: AUDIENCE_CHALLENGE.to_string(),
            provider: provider.as_str().to_string(),
            subject: info.subject.clone(),
            email: info.email.clone(),
            suggested_username: info.suggested_username.clone(),
            iat: now.timestamp(),
            exp: (now + self.challenge_ttl).timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.challenge_encoding)
            .map_err(|e| AppError::InternalServerError(e.into()))?;
        // Same round-trip guarantee as access tokens.
        self.verify_challenge(&token)?;
        Ok(token)
    }

    /// Fails with `ChallengeExpired` past the embedded expiry and
    /// `SignatureInvalid` on any tampering.
    pub fn verify_challenge(&self, token: &str) -> Result<ChallengeClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_audience(&[AUDIENCE_CHALLENGE]);
        validation.set_required_spec_claims(&["exp", "aud"]);
        let data = decode::<ChallengeClaims>(token, &self.challenge_decoding, &validation)
            .map_err(|err| match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::ChallengeExpired,
                _ => AuthError::SignatureInvalid,
            })?;
        Ok(data.claims)
    }

    /// Creates the user, links the provider identity, and opens a session —
    /// only after the echoed challenge verifies.
    pub async fn complete_signup(
        &self,
        challenge_token: &str,
        username: &str,
    ) -> Result<(User, IssuedSession), AppError> {
        let claims = self.verify_challenge(challenge_token)?;

        validate_username(username)
            .map_err(|e| AppError::Validation(vec![format!("username: {}", e.code)]))?;
        if self.users.find_by_username(username).await?.is_some() {
            return Err(AppError::Conflict("Username already taken".to_string()));
        }

        let user = User::new(
            username.to_string(),
            claims.email.clone(),
            None,
            claims.suggested_username.clone(),
            UserRole::Member,
        );
        self.users.insert(&user).await?;
        self.users
            .link_identity(&user.id, &claims.provider, &claims.subject)
            .await?;

        let issued = self.sessions.create_session(&user).await?;
        Ok((user, issued))
    }
}

/// Provider client that performs the real HTTP exchange.
pub struct HttpProviderClient {
    http: reqwest::Client,
    config: Config,
}

impl HttpProviderClient {
    pub fn new(config: Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn credentials(&self, provider: SsoProvider) -> anyhow::Result<(&str, &str)> {
        let pair = match provider {
            SsoProvider::Google => (
                self.config.sso_google_client_id.as_deref(),
                self.config.sso_google_client_secret.as_deref(),
            ),
            SsoProvider::Github => (
                self.config.sso_github_client_id.as_deref(),
                self.config.sso_github_client_secret.as_deref(),
            ),
        };
        match pair {
            (Some(id), Some(secret)) => Ok((id, secret)),
            _ => anyhow::bail!("SSO provider {} is not configured", provider),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenExchangeResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct GoogleProfile {
    sub: String,
    email: Option<String>,
    #[serde(default)]
    given_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GithubProfile {
    id: i64,
    login: String,
    email: Option<String>,
}

#[async_trait]
impl ProviderClient for HttpProviderClient {
    async fn exchange_code(
        &self,
        provider: SsoProvider,
        code: &str,
        redirect_uri: &str,
    ) -> anyhow::Result<ProviderUserInfo> {
        let (client_id, client_secret) = self.credentials(provider)?;
        match provider {
            SsoProvider::Google => {
                let token: TokenExchangeResponse = self
                    .http
                    .post("https://oauth2.googleapis.com/token")
                    .form(&[
                        ("code", code),
                        ("client_id", client_id),
                        ("client_secret", client_secret),
                        ("redirect_uri", redirect_uri),
                        ("grant_type", "authorization_code"),
                    ])
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await?;
                let profile: GoogleProfile = self
                    .http
                    .get("https://openidconnect.googleapis.com/v1/userinfo")
                    .bearer_auth(&token.access_token)
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await?;
                let suggested = profile
                    .email
                    .as_deref()
                    .and_then(|e| e.split('@').next())
                    .or(profile.given_name.as_deref())
                    .unwrap_or("user")
                    .to_lowercase();
                Ok(ProviderUserInfo {
                    subject: profile.sub,
                    email: profile.email,
                    suggested_username: suggested,
                })
            }
            SsoProvider::Github => {
                let token: TokenExchangeResponse = self
                    .http
                    .post("https://github.com/login/oauth/access_token")
                    .header(reqwest::header::ACCEPT, "application/json")
                    .form(&[
                        ("code", code),
                        ("client_id", client_id),
                        ("client_secret", client_secret),
                        ("redirect_uri", redirect_uri),
                    ])
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await?;
                let profile: GithubProfile = self
                    .http
                    .get("https://api.github.com/user")
                    .header(reqwest::header::USER_AGENT, "gatehouse-backend")
                    .bearer_auth(&token.access_token)
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await?;
                Ok(ProviderUserInfo {
                    subject: profile.id.to_string(),
                    email: profile.email,
                    suggested_username: profile.login.to_lowercase(),
                })
            }
        }
    }
}

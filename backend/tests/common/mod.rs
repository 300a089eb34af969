//! Shared fixtures for integration tests: mocked stores, a test
//! configuration, and helpers to mint credentials against known state.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use gatehouse_backend::auth::token::TokenCodec;
use gatehouse_backend::config::Config;
use gatehouse_backend::models::application::Application;
use gatehouse_backend::models::session::Session;
use gatehouse_backend::models::user::{IdentityLink, User, UserRole};
use gatehouse_backend::repositories::{ApplicationStore, SessionStore, UserStore};
use gatehouse_backend::services::auth::AuthService;
use gatehouse_backend::services::presence::{PresenceRecord, PresenceStore};
use gatehouse_backend::services::session::{ExpiryPolicy, SessionService};
use gatehouse_backend::services::sso::{ProviderClient, ProviderUserInfo, SsoProvider, SsoService};
use gatehouse_backend::state::AppState;
use gatehouse_backend::types::{ApplicationId, SessionId, UserId};
use gatehouse_backend::ws::rooms::RoomRegistry;

mockall::mock! {
    pub Sessions {}

    #[async_trait]
    impl SessionStore for Sessions {
        async fn insert(&self, session: &Session) -> anyhow::Result<()>;
        async fn find_by_id(&self, id: &SessionId) -> anyhow::Result<Option<Session>>;
        async fn find_by_id_and_hash(
            &self,
            id: &SessionId,
            secret_hash: &str,
        ) -> anyhow::Result<Option<Session>>;
        async fn rotate_secret(
            &self,
            id: &SessionId,
            expected_hash: &str,
            new_hash: &str,
            expires_at: DateTime<Utc>,
        ) -> anyhow::Result<bool>;
        async fn delete(&self, id: &SessionId) -> anyhow::Result<bool>;
        async fn list_for_user(&self, user_id: &UserId) -> anyhow::Result<Vec<Session>>;
        async fn delete_for_user(&self, user_id: &UserId) -> anyhow::Result<u64>;
    }
}

mockall::mock! {
    pub Users {}

    #[async_trait]
    impl UserStore for Users {
        async fn find_by_id(&self, id: &UserId) -> anyhow::Result<Option<User>>;
        async fn find_by_username(&self, username: &str) -> anyhow::Result<Option<User>>;
        async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
        async fn find_by_username_or_email(&self, identity: &str) -> anyhow::Result<Option<User>>;
        async fn insert(&self, user: &User) -> anyhow::Result<()>;
        async fn find_identity(
            &self,
            provider: &str,
            provider_subject: &str,
        ) -> anyhow::Result<Option<IdentityLink>>;
        async fn link_identity(
            &self,
            user_id: &UserId,
            provider: &str,
            provider_subject: &str,
        ) -> anyhow::Result<()>;
    }
}

mockall::mock! {
    pub Applications {}

    #[async_trait]
    impl ApplicationStore for Applications {
        async fn find_by_identifier(&self, identifier: &str) -> anyhow::Result<Option<Application>>;
    }
}

mockall::mock! {
    pub Presence {}

    #[async_trait]
    impl PresenceStore for Presence {
        async fn record(&self, record: &PresenceRecord, ttl_seconds: u64) -> anyhow::Result<()>;
        async fn get(&self, key: &str) -> anyhow::Result<Option<PresenceRecord>>;
        async fn remove(&self, key: &str) -> anyhow::Result<()>;
    }
}

/// Provider client that returns a fixed profile without touching the
/// network.
pub struct StubProviderClient(pub ProviderUserInfo);

#[async_trait]
impl ProviderClient for StubProviderClient {
    async fn exchange_code(
        &self,
        _provider: SsoProvider,
        _code: &str,
        _redirect_uri: &str,
    ) -> anyhow::Result<ProviderUserInfo> {
        Ok(self.0.clone())
    }
}

pub fn test_config() -> Config {
    Config {
        database_url: "postgres://unused".to_string(),
        redis_url: None,
        redis_pool_size: 1,
        redis_connect_timeout: 1,
        listen_port: 0,
        public_origin: "http://localhost:3000".to_string(),
        user_token_secret: "user-secret-for-tests".to_string(),
        worker_token_secret: "worker-secret-for-tests".to_string(),
        sso_challenge_secret: "challenge-secret-for-tests".to_string(),
        access_token_ttl_minutes: 60,
        worker_token_ttl_minutes: 15,
        session_sliding_hours: 72,
        session_absolute_days: 30,
        sso_challenge_ttl_minutes: 10,
        sso_google_client_id: Some("google-client".to_string()),
        sso_google_client_secret: Some("google-secret".to_string()),
        sso_github_client_id: None,
        sso_github_client_secret: None,
    }
}

pub fn test_codec(config: &Config) -> Arc<TokenCodec> {
    Arc::new(TokenCodec::new(
        &config.user_token_secret,
        &config.worker_token_secret,
    ))
}

pub fn test_policy() -> ExpiryPolicy {
    ExpiryPolicy {
        sliding: Duration::hours(72),
        absolute: Duration::days(30),
    }
}

pub fn session_service(store: Arc<dyn SessionStore>, codec: Arc<TokenCodec>) -> Arc<SessionService> {
    Arc::new(SessionService::new(
        store,
        codec,
        test_policy(),
        Duration::minutes(60),
    ))
}

/// Full application state wired to the given mocks, everything else real.
pub fn build_state(
    users: Arc<dyn UserStore>,
    session_store: Arc<dyn SessionStore>,
    applications: Arc<dyn ApplicationStore>,
    presence: Arc<dyn PresenceStore>,
) -> AppState {
    let config = test_config();
    let codec = test_codec(&config);
    let sessions = session_service(session_store, codec.clone());
    let auth = Arc::new(AuthService::new(users.clone(), sessions.clone()).expect("auth service"));
    let sso = Arc::new(SsoService::new(
        users.clone(),
        sessions.clone(),
        Arc::new(StubProviderClient(ProviderUserInfo {
            subject: "stub-subject".to_string(),
            email: Some("stub@example.com".to_string()),
            suggested_username: "stub".to_string(),
        })),
        config.clone(),
    ));
    AppState {
        config,
        codec,
        sessions,
        auth,
        sso,
        users,
        applications,
        presence,
        rooms: Arc::new(RoomRegistry::new()),
    }
}

pub fn sample_user(role: UserRole) -> User {
    User::new(
        "alice".to_string(),
        Some("alice@example.com".to_string()),
        Some("$argon2id$unused".to_string()),
        "Alice Example".to_string(),
        role,
    )
}

pub fn live_session(user: &User) -> Session {
    let now = Utc::now();
    Session {
        id: SessionId::new(),
        user_id: user.id.clone(),
        scopes: user.role.default_scopes(),
        secret_hash: "stored-secret-hash".to_string(),
        created_at: now,
        updated_at: now,
        expires_at: now + Duration::hours(72),
    }
}

/// Mints an access token that matches the given session row.
pub fn issue_user_token(codec: &TokenCodec, user: &User, session: &Session) -> String {
    let (token, _claims) = codec
        .sign_user(
            &user.id,
            &session.id,
            session.scopes.clone(),
            Some(user.role.as_str().to_string()),
            Duration::minutes(60),
        )
        .expect("sign user token");
    token
}

pub fn sample_application(identifier: &str, public_key: &str, enabled: bool) -> Application {
    Application {
        id: ApplicationId::new(),
        identifier: identifier.to_string(),
        name: identifier.to_string(),
        public_key: public_key.to_string(),
        enabled,
        created_at: Utc::now(),
    }
}

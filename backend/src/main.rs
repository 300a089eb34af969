use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gatehouse_backend::auth::token::TokenCodec;
use gatehouse_backend::build_router;
use gatehouse_backend::config::Config;
use gatehouse_backend::db::{connection::create_pool, redis::create_redis_pool};
use gatehouse_backend::repositories::{PgApplicationStore, PgSessionStore, PgUserStore};
use gatehouse_backend::services::auth::AuthService;
use gatehouse_backend::services::presence::{
    MemoryPresenceStore, PresenceStore, RedisPresenceStore,
};
use gatehouse_backend::services::session::{ExpiryPolicy, SessionService};
use gatehouse_backend::services::sso::{HttpProviderClient, SsoService};
use gatehouse_backend::state::AppState;
use gatehouse_backend::ws::rooms::RoomRegistry;

fn mask(secret: &str) -> String {
    let visible: String = secret.chars().take(4).collect();
    format!("{visible}***")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gatehouse_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    tracing::info!(
        port = config.listen_port,
        user_secret = %mask(&config.user_token_secret),
        worker_secret = %mask(&config.worker_token_secret),
        "Configuration loaded"
    );

    let pool = create_pool(&config.database_url).await?;
    sqlx::migrate!("./migrations").run(pool.as_ref()).await?;
    tracing::info!("Database migrations applied");

    let presence: Arc<dyn PresenceStore> = match create_redis_pool(&config).await? {
        Some(redis) => Arc::new(RedisPresenceStore::new(redis)),
        None => Arc::new(MemoryPresenceStore::new()),
    };

    let users = Arc::new(PgUserStore::new(pool.clone()));
    let applications = Arc::new(PgApplicationStore::new(pool.clone()));
    let session_store = Arc::new(PgSessionStore::new(pool.clone()));

    let codec = Arc::new(TokenCodec::new(
        &config.user_token_secret,
        &config.worker_token_secret,
    ));
    let policy = ExpiryPolicy {
        sliding: Duration::hours(config.session_sliding_hours as i64),
        absolute: Duration::days(config.session_absolute_days as i64),
    };
    let sessions = Arc::new(SessionService::new(
        session_store,
        codec.clone(),
        policy,
        Duration::minutes(config.access_token_ttl_minutes as i64),
    ));
    let auth = Arc::new(AuthService::new(users.clone(), sessions.clone())?);
    let sso = Arc::new(SsoService::new(
        users.clone(),
        sessions.clone(),
        Arc::new(HttpProviderClient::new(config.clone())),
        config.clone(),
    ));

    let state = AppState {
        config: config.clone(),
        codec,
        sessions,
        auth,
        sso,
        users,
        applications,
        presence,
        rooms: Arc::new(RoomRegistry::new()),
    };

    let app = build_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.listen_port));
    tracing::info!(%addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

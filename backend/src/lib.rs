pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod services;
pub mod state;
pub mod types;
pub mod utils;
pub mod validation;
pub mod ws;

use axum::{
    http::StatusCode,
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::middleware::auth::{require_auth, RouteAuth};
use crate::state::AppState;

async fn health() -> StatusCode {
    StatusCode::OK
}

/// Assembles the full application router around the given state. Kept out of
/// `main` so integration tests can drive it with injected stores.
pub fn build_router(state: AppState) -> Router {
    let public = Router::new()
        .route("/health", get(health))
        .route("/api/auth/signup", post(handlers::auth::signup))
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/auth/refresh", post(handlers::auth::refresh))
        .route("/api/auth/sso/{provider}", get(handlers::auth::sso_initiate))
        .route(
            "/api/auth/sso/{provider}/callback",
            get(handlers::auth::sso_callback),
        )
        .route("/api/auth/sso/complete", post(handlers::auth::sso_complete))
        .route("/api/channel", get(ws::gateway::channel_handler));

    let user = Router::new()
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route("/api/auth/me", get(handlers::auth::me))
        .route("/api/sessions", get(handlers::sessions::list_sessions))
        .route(
            "/api/sessions/{id}",
            delete(handlers::sessions::revoke_session),
        )
        .route_layer(from_fn_with_state(
            (state.clone(), RouteAuth::user()),
            require_auth,
        ));

    let admin = Router::new()
        .route(
            "/api/worker-tokens",
            post(handlers::workers::create_worker_token),
        )
        .route_layer(from_fn_with_state(
            (state.clone(), RouteAuth::user_with_scopes(&["apps:manage"])),
            require_auth,
        ));

    Router::new()
        .merge(public)
        .merge(user)
        .merge(admin)
        .layer(from_fn(middleware::request_id::request_id))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

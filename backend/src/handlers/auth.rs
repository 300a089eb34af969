//! Account and session endpoints: signup, login, refresh, logout, SSO.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Redirect,
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AuthError};
use crate::middleware::auth::Actor;
use crate::models::user::{LoginRequest, LoginResponse, SignupRequest, UserResponse};
use crate::services::session::IssuedSession;
use crate::services::sso::{SsoOutcome, SsoProvider};
use crate::state::AppState;

fn login_response(user: UserResponse, issued: IssuedSession) -> LoginResponse {
    LoginResponse {
        access_token: issued.access_token,
        refresh_token: issued.refresh_token,
        expires_at: issued.session.expires_at,
        user,
    }
}

pub async fn signup(
    State(state): State<AppState>,
    Json(request): Json<SignupRequest>,
) -> Result<(StatusCode, Json<UserResponse>), AppError> {
    let user = state.auth.signup(request).await?;
    tracing::info!(username = %user.username, "User signed up");
    Ok((StatusCode::CREATED, Json(user.into())))
}

pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let (user, issued) = state.auth.login(&request.username, &request.password).await?;
    tracing::info!(username = %user.username, "User logged in");
    Ok(Json(login_response(user.into(), issued)))
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Rotates the refresh secret and mints a fresh token pair. The presented
/// refresh token is single-use; after this call only the returned one works.
pub async fn refresh(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let session = state
        .sessions
        .verify_with_refresh_token(&request.refresh_token)
        .await?;
    let user = state
        .users
        .find_by_id(&session.user_id)
        .await?
        .ok_or(AuthError::SessionInvalid)?;
    let issued = state.sessions.extend_session(&session, &user).await?;
    Ok(Json(login_response(user.into(), issued)))
}

#[derive(Debug, Deserialize, Default)]
pub struct LogoutRequest {
    /// Revoke the session owning this refresh token instead of the current
    /// one.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Revoke every session of the calling user.
    #[serde(default)]
    pub all: bool,
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub revoked: u64,
}

/// Revokes sessions. An empty body (`{}`) revokes the current session.
pub async fn logout(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<LogoutRequest>,
) -> Result<Json<LogoutResponse>, AppError> {
    let session = actor.session().ok_or(AuthError::Unauthorized)?;

    if request.all {
        let revoked = state.sessions.revoke_all_for_user(&session.user_id).await?;
        return Ok(Json(LogoutResponse { revoked }));
    }

    if let Some(refresh_token) = &request.refresh_token {
        let target = state
            .sessions
            .verify_with_refresh_token(refresh_token)
            .await?;
        if target.user_id != session.user_id {
            return Err(AuthError::Unauthorized.into());
        }
        state.sessions.revoke(&target.id).await?;
        return Ok(Json(LogoutResponse { revoked: 1 }));
    }

    state.sessions.revoke(&session.id).await?;
    Ok(Json(LogoutResponse { revoked: 1 }))
}

pub async fn me(Extension(actor): Extension<Actor>) -> Result<Json<UserResponse>, AppError> {
    let user = actor.user().ok_or(AuthError::Unauthorized)?;
    Ok(Json(user.clone().into()))
}

pub async fn sso_initiate(
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> Result<Redirect, AppError> {
    let provider: SsoProvider = provider.parse()?;
    let url = state.sso.initiate(provider, &state.config.public_origin)?;
    Ok(Redirect::temporary(url.as_str()))
}

#[derive(Debug, Deserialize)]
pub struct SsoCallbackParams {
    pub code: String,
}

/// Either a full login or a username challenge the client must echo back to
/// `sso_complete`.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SsoCallbackResponse {
    LoggedIn(LoginResponse),
    UsernameRequired {
        challenge: String,
        suggested_username: String,
    },
}

pub async fn sso_callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(params): Query<SsoCallbackParams>,
) -> Result<Json<SsoCallbackResponse>, AppError> {
    let provider: SsoProvider = provider.parse()?;
    let outcome = state
        .sso
        .handle_callback(provider, &params.code, &state.config.public_origin)
        .await?;
    let response = match outcome {
        SsoOutcome::LoggedIn { user, issued } => {
            tracing::info!(username = %user.username, %provider, "SSO login");
            SsoCallbackResponse::LoggedIn(login_response(user.into(), issued))
        }
        SsoOutcome::UsernameChallenge {
            challenge,
            suggested_username,
        } => SsoCallbackResponse::UsernameRequired {
            challenge,
            suggested_username,
        },
    };
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct SsoCompleteRequest {
    pub challenge: String,
    pub username: String,
}

pub async fn sso_complete(
    State(state): State<AppState>,
    Json(request): Json<SsoCompleteRequest>,
) -> Result<(StatusCode, Json<LoginResponse>), AppError> {
    let (user, issued) = state
        .sso
        .complete_signup(&request.challenge, &request.username)
        .await?;
    tracing::info!(username = %user.username, "SSO signup completed");
    Ok((StatusCode::CREATED, Json(login_response(user.into(), issued))))
}

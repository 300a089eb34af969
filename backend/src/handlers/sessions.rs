//! Session introspection and revocation for the calling user.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{AppError, AuthError};
use crate::middleware::auth::Actor;
use crate::state::AppState;
use crate::types::SessionId;

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub id: SessionId,
    pub scopes: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Whether this row backs the access token making the request.
    pub current: bool,
}

pub async fn list_sessions(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<Vec<SessionResponse>>, AppError> {
    let current = actor.session().ok_or(AuthError::Unauthorized)?;
    let sessions = state.sessions.list_for_user(&current.user_id).await?;
    let response = sessions
        .into_iter()
        .map(|session| SessionResponse {
            current: session.id == current.id,
            id: session.id,
            scopes: session.scopes,
            created_at: session.created_at,
            expires_at: session.expires_at,
        })
        .collect();
    Ok(Json(response))
}

pub async fn revoke_session(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<SessionId>,
) -> Result<StatusCode, AppError> {
    let current = actor.session().ok_or(AuthError::Unauthorized)?;
    let owned = state
        .sessions
        .list_for_user(&current.user_id)
        .await?
        .into_iter()
        .any(|session| session.id == id);
    if !owned {
        return Err(AppError::NotFound("Session not found".to_string()));
    }
    state.sessions.revoke(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

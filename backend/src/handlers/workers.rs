//! Minting of short-lived application-worker tokens by administrators.

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AuthError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WorkerTokenRequest {
    pub application_identifier: String,
}

#[derive(Debug, Serialize)]
pub struct WorkerTokenResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

pub async fn create_worker_token(
    State(state): State<AppState>,
    Json(request): Json<WorkerTokenRequest>,
) -> Result<(StatusCode, Json<WorkerTokenResponse>), AppError> {
    let application = state
        .applications
        .find_by_identifier(&request.application_identifier)
        .await?
        .ok_or_else(|| AppError::NotFound("Application not found".to_string()))?;
    if !application.enabled {
        return Err(AuthError::Unauthorized.into());
    }

    let ttl = Duration::minutes(state.config.worker_token_ttl_minutes as i64);
    let (token, claims) = state
        .codec
        .sign_worker(&application.identifier, ttl)
        .map_err(AppError::InternalServerError)?;
    tracing::info!(application = %application.identifier, "Worker token minted");
    Ok((
        StatusCode::CREATED,
        Json(WorkerTokenResponse {
            token,
            expires_at: DateTime::from_timestamp(claims.exp, 0).unwrap_or_else(Utc::now),
        }),
    ))
}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Credential and session failures. Every kind is terminal for the current
/// request or connection; none are retried internally.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    /// Structurally invalid credential (bad delimiter, bad id, bad encoding).
    #[error("Malformed token")]
    MalformedToken,
    /// Signature, algorithm, or payload shape mismatch.
    #[error("Invalid token")]
    TokenInvalid,
    /// Valid signature, past the embedded expiry.
    #[error("Token expired")]
    TokenExpired,
    /// No matching live session for the presented credential.
    #[error("Invalid session")]
    SessionInvalid,
    /// Session past its computed expiry; the caller must re-authenticate.
    #[error("Session expired")]
    SessionExpired,
    /// Credential mismatch. Deliberately non-specific to avoid enumeration.
    #[error("Invalid username or password")]
    LoginInvalid,
    /// SSO username challenge past its embedded expiry.
    #[error("Challenge expired")]
    ChallengeExpired,
    /// SSO username challenge signature does not verify.
    #[error("Invalid challenge signature")]
    SignatureInvalid,
    /// Scheme or scope mismatch at the authorization guard.
    #[error("Unauthorized")]
    Unauthorized,
}

impl AuthError {
    /// Stable machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::MalformedToken => "MALFORMED_TOKEN",
            AuthError::TokenInvalid => "TOKEN_INVALID",
            AuthError::TokenExpired => "TOKEN_EXPIRED",
            AuthError::SessionInvalid => "SESSION_INVALID",
            AuthError::SessionExpired => "SESSION_EXPIRED",
            AuthError::LoginInvalid => "LOGIN_INVALID",
            AuthError::ChallengeExpired => "CHALLENGE_EXPIRED",
            AuthError::SignatureInvalid => "SIGNATURE_INVALID",
            AuthError::Unauthorized => "UNAUTHORIZED",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AuthError::MalformedToken => StatusCode::BAD_REQUEST,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Auth(#[from] AuthError),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),
    #[error("Validation failed")]
    Validation(Vec<String>),
    #[error("Internal server error")]
    InternalServerError(#[source] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message, code, details) = match self {
            AppError::Auth(err) => (err.status(), err.to_string(), err.code().to_string(), None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, "NOT_FOUND".to_string(), None),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg, "CONFLICT".to_string(), None),
            AppError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                msg,
                "BAD_REQUEST".to_string(),
                None,
            ),
            AppError::UnsupportedProvider(provider) => (
                StatusCode::BAD_REQUEST,
                format!("Unsupported provider: {}", provider),
                "UNSUPPORTED_PROVIDER".to_string(),
                None,
            ),
            AppError::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                "Validation failed".to_string(),
                "VALIDATION_ERROR".to_string(),
                Some(serde_json::json!({ "errors": errors })),
            ),
            AppError::InternalServerError(err) => {
                tracing::error!("Internal server error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    "INTERNAL_SERVER_ERROR".to_string(),
                    None,
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_message,
            code,
            details,
        });

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalServerError(err)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("Resource not found".to_string()),
            _ => AppError::InternalServerError(err.into()),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let messages: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| {
                    let code = e.code.as_ref();
                    format!("{}: {}", field, code)
                })
            })
            .collect();
        AppError::Validation(messages)
    }
}

//! Per-request authorization guard.
//!
//! Routes declare which actor schemes may call them and which scopes they
//! require; the guard extracts the bearer credential, dispatches to the
//! scheme's verifier, and attaches the resolved actor to the request.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use crate::auth::token::TokenCodec;
use crate::auth::Subject;
use crate::error::{AppError, AuthError};
use crate::models::application::Application;
use crate::models::session::Session;
use crate::models::user::User;
use crate::state::AppState;

/// Actor classes a route may admit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    User,
    Worker,
    App,
}

/// Declarative per-route auth configuration, passed to the guard at route
/// registration time.
#[derive(Debug, Clone)]
pub struct RouteAuth {
    pub schemes: &'static [AuthScheme],
    pub required_scopes: &'static [&'static str],
}

impl RouteAuth {
    pub const fn user() -> Self {
        Self {
            schemes: &[AuthScheme::User],
            required_scopes: &[],
        }
    }

    pub const fn user_with_scopes(scopes: &'static [&'static str]) -> Self {
        Self {
            schemes: &[AuthScheme::User],
            required_scopes: scopes,
        }
    }

    pub const fn worker() -> Self {
        Self {
            schemes: &[AuthScheme::Worker],
            required_scopes: &[],
        }
    }

    pub const fn app() -> Self {
        Self {
            schemes: &[AuthScheme::App],
            required_scopes: &[],
        }
    }
}

/// The verified caller attached to request extensions.
#[derive(Debug, Clone)]
pub struct Actor {
    pub identity: ActorIdentity,
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum ActorIdentity {
    User { user: User, session: Session },
    Worker { application: Application },
    App { application: Application },
}

impl Actor {
    pub fn user(&self) -> Option<&User> {
        match &self.identity {
            ActorIdentity::User { user, .. } => Some(user),
            _ => None,
        }
    }

    pub fn session(&self) -> Option<&Session> {
        match &self.identity {
            ActorIdentity::User { session, .. } => Some(session),
            _ => None,
        }
    }
}

pub async fn require_auth(
    State((state, route)): State<(AppState, RouteAuth)>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_bearer_token)
        .map(str::to_owned)
        .ok_or(AuthError::Unauthorized)?;

    let actor = authenticate(&state, &route, &token).await?;

    if !route
        .required_scopes
        .iter()
        .all(|required| actor.scopes.iter().any(|granted| granted == required))
    {
        return Err(AuthError::Unauthorized.into());
    }

    request.extensions_mut().insert(actor);
    Ok(next.run(request).await)
}

fn parse_bearer_token(header: &str) -> Option<&str> {
    let (scheme, rest) = header.split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") {
        Some(rest.trim_start())
    } else {
        None
    }
}

async fn authenticate(
    state: &AppState,
    route: &RouteAuth,
    token: &str,
) -> Result<Actor, AppError> {
    let mut last_error = AuthError::Unauthorized;
    for scheme in route.schemes {
        match verify_scheme(state, *scheme, token).await {
            Ok(actor) => return Ok(actor),
            Err(AppError::Auth(err)) => last_error = err,
            Err(other) => return Err(other),
        }
    }
    Err(last_error.into())
}

async fn verify_scheme(
    state: &AppState,
    scheme: AuthScheme,
    token: &str,
) -> Result<Actor, AppError> {
    match scheme {
        AuthScheme::User => {
            let claims = state.codec.verify_user(token)?;
            let session = state.sessions.verify_with_access_token(&claims).await?;
            let user = state
                .users
                .find_by_id(&session.user_id)
                .await?
                .ok_or(AuthError::SessionInvalid)?;
            Ok(Actor {
                scopes: claims.scp,
                identity: ActorIdentity::User { user, session },
            })
        }
        AuthScheme::Worker => {
            let claims = state.codec.verify_worker(token)?;
            let Subject::AppWorker(identifier) = claims.subject()? else {
                return Err(AuthError::TokenInvalid.into());
            };
            let application = fetch_enabled_application(state, &identifier).await?;
            Ok(Actor {
                scopes: claims.scp,
                identity: ActorIdentity::Worker { application },
            })
        }
        AuthScheme::App => {
            // The token tells us which application key to verify against;
            // nothing from this decode is trusted until verify_app passes.
            let unverified = TokenCodec::decode_unsafe(token)?;
            let Subject::App(identifier) = unverified.subject()? else {
                return Err(AuthError::TokenInvalid.into());
            };
            let application = fetch_enabled_application(state, &identifier).await?;
            let claims = state.codec.verify_app(token, &application.public_key)?;
            Ok(Actor {
                scopes: claims.scp,
                identity: ActorIdentity::App { application },
            })
        }
    }
}

async fn fetch_enabled_application(
    state: &AppState,
    identifier: &str,
) -> Result<Application, AppError> {
    let application = state
        .applications
        .find_by_identifier(identifier)
        .await?
        .ok_or(AuthError::Unauthorized)?;
    if !application.enabled {
        return Err(AuthError::Unauthorized.into());
    }
    Ok(application)
}

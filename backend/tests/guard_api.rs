mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::middleware::from_fn_with_state;
use axum::routing::get;
use axum::{Extension, Json, Router};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::RsaPrivateKey;
use serde_json::Value;
use tower::ServiceExt;

use gatehouse_backend::auth::token::{AccessClaims, AUDIENCE_ACCESS};
use gatehouse_backend::build_router;
use gatehouse_backend::middleware::auth::{require_auth, Actor, ActorIdentity, RouteAuth};
use gatehouse_backend::models::user::UserRole;
use gatehouse_backend::state::AppState;

use common::{
    build_state, issue_user_token, live_session, sample_application, sample_user,
    MockApplications, MockPresence, MockSessions, MockUsers,
};

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn get_request(uri: &str, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn valid_user_token_reaches_protected_route() {
    let user = sample_user(UserRole::Member);
    let session = live_session(&user);

    let mut sessions = MockSessions::new();
    {
        let session = session.clone();
        sessions
            .expect_find_by_id()
            .returning(move |_| Ok(Some(session.clone())));
    }
    let mut users = MockUsers::new();
    {
        let user = user.clone();
        users
            .expect_find_by_id()
            .returning(move |_| Ok(Some(user.clone())));
    }

    let state = build_state(
        Arc::new(users),
        Arc::new(sessions),
        Arc::new(MockApplications::new()),
        Arc::new(MockPresence::new()),
    );
    let token = issue_user_token(&state.codec, &user, &session);
    let app = build_router(state);

    let response = app
        .oneshot(get_request("/api/auth/me", Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["username"], "alice");
    assert!(body.get("password_hash").is_none());
}

#[tokio::test]
async fn missing_header_is_unauthorized() {
    let state = build_state(
        Arc::new(MockUsers::new()),
        Arc::new(MockSessions::new()),
        Arc::new(MockApplications::new()),
        Arc::new(MockPresence::new()),
    );
    let app = build_router(state);

    let response = app.oneshot(get_request("/api/auth/me", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn worker_token_is_rejected_on_user_route() {
    let state = build_state(
        Arc::new(MockUsers::new()),
        Arc::new(MockSessions::new()),
        Arc::new(MockApplications::new()),
        Arc::new(MockPresence::new()),
    );
    let (worker_token, _) = state
        .codec
        .sign_worker("transcoder", Duration::minutes(5))
        .unwrap();
    let app = build_router(state);

    let response = app
        .oneshot(get_request("/api/auth/me", Some(&worker_token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["code"], "TOKEN_INVALID");
}

#[tokio::test]
async fn revoked_session_is_rejected_with_session_invalid() {
    let user = sample_user(UserRole::Member);
    let session = live_session(&user);

    let mut sessions = MockSessions::new();
    sessions.expect_find_by_id().returning(|_| Ok(None));

    let state = build_state(
        Arc::new(MockUsers::new()),
        Arc::new(sessions),
        Arc::new(MockApplications::new()),
        Arc::new(MockPresence::new()),
    );
    let token = issue_user_token(&state.codec, &user, &session);
    let app = build_router(state);

    let response = app
        .oneshot(get_request("/api/auth/me", Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["code"], "SESSION_INVALID");
}

/// Members lack `apps:manage`; the guard refuses before the handler runs, so
/// the application store is never consulted.
#[tokio::test]
async fn scope_mismatch_is_unauthorized() {
    let user = sample_user(UserRole::Member);
    let session = live_session(&user);

    let mut sessions = MockSessions::new();
    {
        let session = session.clone();
        sessions
            .expect_find_by_id()
            .returning(move |_| Ok(Some(session.clone())));
    }
    let mut users = MockUsers::new();
    {
        let user = user.clone();
        users
            .expect_find_by_id()
            .returning(move |_| Ok(Some(user.clone())));
    }
    let mut applications = MockApplications::new();
    applications.expect_find_by_identifier().times(0);

    let state = build_state(
        Arc::new(users),
        Arc::new(sessions),
        Arc::new(applications),
        Arc::new(MockPresence::new()),
    );
    let token = issue_user_token(&state.codec, &user, &session);
    let app = build_router(state);

    let request = Request::builder()
        .method("POST")
        .uri("/api/worker-tokens")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            r#"{"application_identifier":"transcoder"}"#,
        ))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_can_mint_worker_token() {
    let admin = sample_user(UserRole::Admin);
    let session = live_session(&admin);

    let mut sessions = MockSessions::new();
    {
        let session = session.clone();
        sessions
            .expect_find_by_id()
            .returning(move |_| Ok(Some(session.clone())));
    }
    let mut users = MockUsers::new();
    {
        let admin = admin.clone();
        users
            .expect_find_by_id()
            .returning(move |_| Ok(Some(admin.clone())));
    }
    let mut applications = MockApplications::new();
    applications
        .expect_find_by_identifier()
        .returning(|identifier| {
            Ok(Some(common::sample_application(
                identifier,
                "-----BEGIN PUBLIC KEY-----\nunused\n-----END PUBLIC KEY-----",
                true,
            )))
        });

    let state = build_state(
        Arc::new(users),
        Arc::new(sessions),
        Arc::new(applications),
        Arc::new(MockPresence::new()),
    );
    let token = issue_user_token(&state.codec, &admin, &session);
    let codec = state.codec.clone();
    let app = build_router(state);

    let request = Request::builder()
        .method("POST")
        .uri("/api/worker-tokens")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            r#"{"application_identifier":"transcoder"}"#,
        ))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    let minted = body["token"].as_str().unwrap();
    assert!(codec.verify_worker(minted).is_ok());
}

async fn whoami(Extension(actor): Extension<Actor>) -> Json<Value> {
    let name = match &actor.identity {
        ActorIdentity::User { user, .. } => user.username.clone(),
        ActorIdentity::Worker { application } | ActorIdentity::App { application } => {
            application.identifier.clone()
        }
    };
    Json(serde_json::json!({ "actor": name }))
}

/// Route mounted behind the given scheme configuration, the same
/// `route_layer(from_fn_with_state(...))` wiring the real router uses.
fn guarded_route(state: AppState, route: RouteAuth) -> Router {
    Router::new()
        .route("/internal/whoami", get(whoami))
        .route_layer(from_fn_with_state((state, route), require_auth))
}

fn rsa_keypair() -> (String, String) {
    let mut rng = rand::thread_rng();
    let private = RsaPrivateKey::new(&mut rng, 2048).expect("generate key");
    let private_pem = private
        .to_pkcs8_pem(LineEnding::LF)
        .expect("private pem")
        .to_string();
    let public_pem = private
        .to_public_key()
        .to_public_key_pem(LineEnding::LF)
        .expect("public pem");
    (private_pem, public_pem)
}

fn sign_app_token(private_pem: &str, identifier: &str) -> String {
    let now = Utc::now();
    let claims = AccessClaims {
        aud: AUDIENCE_ACCESS.to_string(),
        jti: "app-rest".to_string(),
        sub: format!("APP:{identifier}"),
        scp: vec![],
        role: None,
        iat: now.timestamp(),
        exp: (now + Duration::minutes(5)).timestamp(),
    };
    encode(
        &Header::new(Algorithm::RS256),
        &claims,
        &EncodingKey::from_rsa_pem(private_pem.as_bytes()).unwrap(),
    )
    .unwrap()
}

#[tokio::test]
async fn worker_scheme_admits_workers_and_rejects_user_tokens() {
    let user = sample_user(UserRole::Member);
    let session = live_session(&user);

    let mut applications = MockApplications::new();
    applications
        .expect_find_by_identifier()
        .returning(|identifier| Ok(Some(sample_application(identifier, "unused", true))));

    let state = build_state(
        Arc::new(MockUsers::new()),
        Arc::new(MockSessions::new()),
        Arc::new(applications),
        Arc::new(MockPresence::new()),
    );
    let (worker_token, _) = state
        .codec
        .sign_worker("transcoder", Duration::minutes(5))
        .unwrap();
    let user_token = issue_user_token(&state.codec, &user, &session);
    let app = guarded_route(state, RouteAuth::worker());

    let response = app
        .clone()
        .oneshot(get_request("/internal/whoami", Some(&worker_token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["actor"], "transcoder");

    // A user-session token must never pass the worker-key verifier.
    let response = app
        .oneshot(get_request("/internal/whoami", Some(&user_token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["code"], "TOKEN_INVALID");
}

#[tokio::test]
async fn worker_scheme_refuses_disabled_application() {
    let mut applications = MockApplications::new();
    applications
        .expect_find_by_identifier()
        .returning(|identifier| Ok(Some(sample_application(identifier, "unused", false))));

    let state = build_state(
        Arc::new(MockUsers::new()),
        Arc::new(MockSessions::new()),
        Arc::new(applications),
        Arc::new(MockPresence::new()),
    );
    let (worker_token, _) = state
        .codec
        .sign_worker("transcoder", Duration::minutes(5))
        .unwrap();
    let app = guarded_route(state, RouteAuth::worker());

    let response = app
        .oneshot(get_request("/internal/whoami", Some(&worker_token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn app_scheme_verifies_against_stored_key_and_rejects_workers() {
    let (private_pem, public_pem) = rsa_keypair();

    let mut applications = MockApplications::new();
    {
        let public_pem = public_pem.clone();
        applications
            .expect_find_by_identifier()
            .returning(move |identifier| {
                Ok(Some(sample_application(identifier, &public_pem, true)))
            });
    }

    let state = build_state(
        Arc::new(MockUsers::new()),
        Arc::new(MockSessions::new()),
        Arc::new(applications),
        Arc::new(MockPresence::new()),
    );
    let app_token = sign_app_token(&private_pem, "transcoder");
    let (worker_token, _) = state
        .codec
        .sign_worker("transcoder", Duration::minutes(5))
        .unwrap();
    let app = guarded_route(state, RouteAuth::app());

    let response = app
        .clone()
        .oneshot(get_request("/internal/whoami", Some(&app_token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["actor"], "transcoder");

    // A worker token decodes but carries the wrong subject class.
    let response = app
        .oneshot(get_request("/internal/whoami", Some(&worker_token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["code"], "TOKEN_INVALID");
}

#[tokio::test]
async fn app_scheme_rejects_token_signed_with_foreign_key() {
    let (private_pem, _) = rsa_keypair();
    let (_, other_public) = rsa_keypair();

    let mut applications = MockApplications::new();
    applications
        .expect_find_by_identifier()
        .returning(move |identifier| {
            Ok(Some(sample_application(identifier, &other_public, true)))
        });

    let state = build_state(
        Arc::new(MockUsers::new()),
        Arc::new(MockSessions::new()),
        Arc::new(applications),
        Arc::new(MockPresence::new()),
    );
    let app_token = sign_app_token(&private_pem, "transcoder");
    let app = guarded_route(state, RouteAuth::app());

    let response = app
        .oneshot(get_request("/internal/whoami", Some(&app_token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["code"], "TOKEN_INVALID");
}

#[tokio::test]
async fn responses_echo_a_request_id() {
    let state = build_state(
        Arc::new(MockUsers::new()),
        Arc::new(MockSessions::new()),
        Arc::new(MockApplications::new()),
        Arc::new(MockPresence::new()),
    );
    let app = build_router(state);

    let response = app.oneshot(get_request("/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
}

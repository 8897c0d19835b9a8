//! End-to-end session lifecycle against a real Postgres instance.
//!
//! Requires `QUILL_TEST_DSN` pointing at a disposable database; each test
//! returns early without it so the default `cargo test` run stays green.

use anyhow::{Context, Result};
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use quill::{
    api::{self, AuthConfig, AuthState, BcryptVerifier, CaptchaVerifier},
    store::users,
    token::{revocation::InMemoryRevocationStore, TokenService},
};
use secrecy::SecretString;
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

const TEST_PASSWORD: &str = "correct horse battery staple";

async fn test_app() -> Result<Option<(Router, String)>> {
    let Ok(dsn) = std::env::var("QUILL_TEST_DSN") else {
        return Ok(None);
    };

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&dsn)
        .await
        .context("Failed to connect to test database")?;

    users::ensure_schema(&pool).await?;

    // Unique admin per run so lockout state never leaks between runs.
    let username = format!("e2e-admin-{}", Uuid::new_v4());
    let password_hash = bcrypt::hash(TEST_PASSWORD, 4)?;
    users::bootstrap_admin(&pool, &username, &password_hash).await?;

    let state = Arc::new(AuthState::new(
        AuthConfig::new().with_failure_delay_ms(0, 0),
        TokenService::new(&SecretString::from("e2e-signing-secret")),
        Arc::new(InMemoryRevocationStore::new()),
        Arc::new(BcryptVerifier),
        CaptchaVerifier::disabled(),
    ));

    let app = api::app(
        pool,
        state,
        header::HeaderValue::from_static("http://localhost:3000"),
    );

    Ok(Some((app, username)))
}

async fn login(app: &Router, username: &str, password: &str) -> Result<(StatusCode, Value)> {
    let request = Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "username": username, "password": password }).to_string(),
        ))?;

    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let body = response.into_body().collect().await?.to_bytes();
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    Ok((status, body))
}

async fn bearer_request(app: &Router, method: &str, uri: &str, token: &str) -> Result<(StatusCode, Value)> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())?;

    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let body = response.into_body().collect().await?.to_bytes();
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    Ok((status, body))
}

#[tokio::test]
async fn full_session_lifecycle() -> Result<()> {
    let Some((app, username)) = test_app().await? else {
        return Ok(());
    };

    // Login with valid credentials.
    let (status, body) = login(&app, &username, TEST_PASSWORD).await?;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"]
        .as_str()
        .context("login response missing token")?
        .to_string();
    assert_eq!(body["user"]["username"], username.as_str());
    assert_eq!(body["user"]["role"], "admin");

    // The token verifies while the session is live.
    let (status, body) = bearer_request(&app, "GET", "/api/auth/verify", &token).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);

    // Admin capability grants access to the audit log, which already holds
    // the login entry.
    let (status, body) = bearer_request(&app, "GET", "/api/admin/audit", &token).await?;
    assert_eq!(status, StatusCode::OK);
    let entries = body.as_array().context("audit response not an array")?;
    assert!(entries.iter().any(|entry| entry["action"] == "login"));

    // Logout revokes the token.
    let (status, _) = bearer_request(&app, "POST", "/api/auth/logout", &token).await?;
    assert_eq!(status, StatusCode::OK);

    // The revoked token is indistinguishable from a forged one.
    let (status, body) = bearer_request(&app, "GET", "/api/auth/verify", &token).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "INVALID_TOKEN");

    Ok(())
}

#[tokio::test]
async fn rejects_bad_credentials_and_missing_token() -> Result<()> {
    let Some((app, username)) = test_app().await? else {
        return Ok(());
    };

    let (status, body) = login(&app, &username, "not the password").await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "INVALID_CREDENTIALS");

    // Unknown usernames collapse into the same category.
    let (status, body) = login(&app, "no-such-user-ever", "whatever").await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "INVALID_CREDENTIALS");

    let request = Request::builder()
        .method("GET")
        .uri("/api/auth/verify")
        .body(Body::empty())?;
    let response = app.clone().oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = response.into_body().collect().await?.to_bytes();
    let body: Value = serde_json::from_slice(&body)?;
    assert_eq!(body["error"], "NO_TOKEN");

    Ok(())
}

#[tokio::test]
async fn lockout_after_five_failures() -> Result<()> {
    let Some((app, username)) = test_app().await? else {
        return Ok(());
    };

    // Five failures each return the generic rejection; the fifth one stores
    // the lock.
    for _ in 0..5 {
        let (status, body) = login(&app, &username, "wrong").await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "INVALID_CREDENTIALS");
    }

    // The next attempt hits the lock, even with the correct password.
    let (status, body) = login(&app, &username, TEST_PASSWORD).await?;
    assert_eq!(status, StatusCode::LOCKED);
    assert_eq!(body["error"], "ACCOUNT_LOCKED");
    let retry_after = body["retry_after_seconds"]
        .as_i64()
        .context("locked response missing retry_after_seconds")?;
    assert!(retry_after > 0 && retry_after <= 15 * 60);

    Ok(())
}

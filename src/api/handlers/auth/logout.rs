//! Logout endpoint: revoke the token that authenticated the request.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use super::middleware::{request_context, RawToken};
use super::state::AuthState;
use super::types::{AuthErrorResponse, LogoutResponse, UserInfo};
use crate::store::audit;
use crate::token::Claims;

#[utoipa::path(
    post,
    path= "/api/auth/logout",
    security(("bearer" = [])),
    responses (
        (status = 200, description = "Token revoked", body = LogoutResponse, content_type = "application/json"),
        (status = 401, description = "Missing bearer token", body = AuthErrorResponse),
        (status = 403, description = "Invalid or expired token", body = AuthErrorResponse),
    ),
    tag= "auth"
)]
#[instrument(skip_all)]
pub async fn logout(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    claims: Extension<Claims>,
    token: Extension<RawToken>,
) -> impl IntoResponse {
    // Revoke the exact token the authenticate layer admitted. Idempotent:
    // revoking an already-revoked token changes nothing.
    state.revocation().revoke(&token.0 .0);

    let context = request_context(&headers);
    let actor = Uuid::parse_str(&claims.sub).ok();
    audit::record(
        &pool,
        actor,
        "logout",
        json!({"username": claims.username}),
        context.ip,
        context.user_agent.as_deref(),
    )
    .await;

    (
        StatusCode::OK,
        Json(LogoutResponse {
            message: "Logged out".to_string(),
            user: UserInfo::from(&claims.0),
        }),
    )
}

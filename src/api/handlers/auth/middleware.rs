//! Request interceptors: bearer authentication and role authorization.

use axum::{
    extract::{Extension, Request},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::debug;

use super::state::{AuthState, Capabilities, VerifyError, ADMIN_CAPABILITY};
use super::types::{AuthErrorResponse, RoleErrorResponse, INVALID_TOKEN, NO_TOKEN};
use crate::token::{Claims, RequestContext};

/// The exact token string that authenticated the request, kept so the logout
/// handler revokes the same token it was admitted with.
#[derive(Clone, Debug)]
pub struct RawToken(pub String);

/// Reject requests without a valid bearer token.
///
/// On success the verified claims and the raw token are attached to the
/// request extensions for downstream handlers.
pub async fn authenticate(
    Extension(state): Extension<Arc<AuthState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = extract_bearer_token(request.headers()) else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(AuthErrorResponse {
                error: NO_TOKEN.to_string(),
                message: "Missing bearer token".to_string(),
                detail: None,
            }),
        )
            .into_response();
    };

    let current_ip = extract_client_ip(request.headers());
    match state.verify_bearer(&token, current_ip) {
        Ok(claims) => {
            request.extensions_mut().insert(claims);
            request.extensions_mut().insert(RawToken(token));
            next.run(request).await
        }
        Err(err) => invalid_token_response(&err),
    }
}

/// Reject authenticated requests whose role lacks the admin capability.
/// Must run after `authenticate`.
pub async fn require_admin(request: Request, next: Next) -> Response {
    let Some(claims) = request.extensions().get::<Claims>() else {
        // Unreachable when layered after authenticate; kept defensive.
        return StatusCode::UNAUTHORIZED.into_response();
    };

    if Capabilities::from_role(&claims.role).has(ADMIN_CAPABILITY) {
        next.run(request).await
    } else {
        (
            StatusCode::FORBIDDEN,
            Json(RoleErrorResponse {
                error: "FORBIDDEN".to_string(),
                required: ADMIN_CAPABILITY.to_string(),
                current: claims.role.clone(),
            }),
        )
            .into_response()
    }
}

fn invalid_token_response(err: &VerifyError) -> Response {
    debug!("Rejecting bearer token: {}", err.detail());

    // The diagnostic cause is for development only; release builds collapse
    // every failure into the same opaque category.
    let detail = if cfg!(debug_assertions) {
        Some(err.detail())
    } else {
        None
    };

    (
        StatusCode::FORBIDDEN,
        Json(AuthErrorResponse {
            error: INVALID_TOKEN.to_string(),
            message: "Invalid or expired token".to_string(),
            detail,
        }),
    )
        .into_response()
}

pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Extract a client IP from common proxy headers.
pub fn extract_client_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .and_then(|value| value.trim().parse::<IpAddr>().ok());
    if forwarded.is_some() {
        return forwarded;
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<IpAddr>().ok())
}

/// Request metadata carried into token claims and audit entries.
pub fn request_context(headers: &HeaderMap) -> RequestContext {
    RequestContext {
        ip: extract_client_ip(headers),
        user_agent: headers
            .get("user-agent")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
    }
}

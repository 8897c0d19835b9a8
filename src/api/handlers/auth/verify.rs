//! Token verification endpoint for the client session mirror.
//!
//! Frontends call this to reconcile their locally mirrored session with the
//! server's verdict; the mirror is advisory, this endpoint is authoritative.

use axum::{extract::Extension, response::Json};
use tracing::instrument;

use super::types::{AuthErrorResponse, UserInfo, VerifyResponse};
use crate::token::Claims;

#[utoipa::path(
    get,
    path= "/api/auth/verify",
    security(("bearer" = [])),
    responses (
        (status = 200, description = "Token is valid", body = VerifyResponse, content_type = "application/json"),
        (status = 401, description = "Missing bearer token", body = AuthErrorResponse),
        (status = 403, description = "Invalid or expired token", body = AuthErrorResponse),
    ),
    tag= "auth"
)]
#[instrument(skip_all)]
pub async fn verify(claims: Extension<Claims>) -> Json<VerifyResponse> {
    // The authenticate layer already did the work; reaching here means valid.
    Json(VerifyResponse {
        valid: true,
        user: UserInfo::from(&claims.0),
    })
}

//! Admin-only endpoints for the blog's management UI.

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use sqlx::PgPool;
use tracing::{error, instrument};
use utoipa::IntoParams;

use crate::store::audit::{self, AuditEntry};

const DEFAULT_AUDIT_LIMIT: i64 = 50;
const MAX_AUDIT_LIMIT: i64 = 200;

#[derive(IntoParams, Debug, Deserialize, Default)]
#[into_params(parameter_in = Query)]
pub struct AuditQuery {
    /// Number of entries to return, newest first (max 200).
    limit: Option<i64>,
}

#[utoipa::path(
    get,
    path= "/api/admin/audit",
    params(AuditQuery),
    security(("bearer" = [])),
    responses (
        (status = 200, description = "Recent audit entries, newest first", body = [AuditEntry]),
        (status = 401, description = "Missing bearer token"),
        (status = 403, description = "Invalid token or missing admin capability"),
    ),
    tag= "admin"
)]
#[instrument(skip(pool))]
pub async fn audit_log(pool: Extension<PgPool>, query: Query<AuditQuery>) -> Response {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_AUDIT_LIMIT)
        .clamp(1, MAX_AUDIT_LIMIT);

    match audit::recent(&pool, limit).await {
        Ok(entries) => Json(entries).into_response(),
        Err(err) => {
            error!("Error fetching audit entries: {err:#}");

            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error fetching audit log".to_string(),
            )
                .into_response()
        }
    }
}

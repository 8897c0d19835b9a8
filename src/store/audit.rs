//! Append-only audit log of security-relevant actions.
//!
//! Write failures are logged and swallowed: auditing must never block or fail
//! the primary request. Pruning is a DB-admin concern, not handled here.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::{PgPool, Row};
use std::net::IpAddr;
use tracing::{Instrument, error, info_span};
use utoipa::ToSchema;
use uuid::Uuid;

const REDACTION_MARKER: &str = "[REDACTED]";

/// Keys whose values are replaced before the details blob is stored.
const SENSITIVE_KEY_FRAGMENTS: &[&str] = &["password", "token", "captcha"];

/// Stored audit record, as returned to the admin UI.
#[derive(Debug, Serialize, ToSchema)]
pub struct AuditEntry {
    #[schema(value_type = String)]
    pub id: Uuid,
    /// Null for unauthenticated attempts.
    #[schema(value_type = Option<String>)]
    pub actor: Option<Uuid>,
    pub action: String,
    #[schema(value_type = Object)]
    pub details: Value,
    #[schema(value_type = Option<String>)]
    pub ip: Option<IpAddr>,
    pub user_agent: Option<String>,
    #[schema(value_type = String)]
    pub created_at: DateTime<Utc>,
}

/// Replace sensitive values by key-name match, recursively.
///
/// Keys are kept with a redaction marker rather than dropped, so later
/// analysis can still see which fields were present.
#[must_use]
pub fn redact(details: Value) -> Value {
    match details {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| {
                    let lowered = key.to_lowercase();
                    if SENSITIVE_KEY_FRAGMENTS
                        .iter()
                        .any(|fragment| lowered.contains(fragment))
                    {
                        (key, Value::String(REDACTION_MARKER.to_string()))
                    } else {
                        (key, redact(value))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(redact).collect()),
        other => other,
    }
}

/// Append one audit record. Never propagates failure.
pub async fn record(
    pool: &PgPool,
    actor: Option<Uuid>,
    action: &str,
    details: Value,
    ip: Option<IpAddr>,
    user_agent: Option<&str>,
) {
    let details = redact(details);

    let query = r"
        INSERT INTO audit_logs (actor, action, details, ip, user_agent)
        VALUES ($1, $2, $3, $4, $5)
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(actor)
        .bind(action)
        .bind(&details)
        .bind(ip)
        .bind(user_agent)
        .execute(pool)
        .instrument(span)
        .await;

    if let Err(err) = result {
        error!(action, "Failed to write audit log entry: {err}");
    }
}

/// Most recent audit entries, newest first.
///
/// # Errors
/// Returns error on database failure.
pub async fn recent(pool: &PgPool, limit: i64) -> Result<Vec<AuditEntry>> {
    let query = r"
        SELECT id, actor, action, details, ip, user_agent, created_at
        FROM audit_logs
        ORDER BY created_at DESC
        LIMIT $1
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(limit)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to fetch audit entries")?;

    Ok(rows
        .into_iter()
        .map(|row| AuditEntry {
            id: row.get("id"),
            actor: row.get("actor"),
            action: row.get("action"),
            details: row.get("details"),
            ip: row.get("ip"),
            user_agent: row.get("user_agent"),
            created_at: row.get("created_at"),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::users::tests::unreachable_pool;
    use serde_json::json;

    #[test]
    fn redact_replaces_sensitive_keys() {
        let redacted = redact(json!({
            "username": "admin",
            "password": "hunter2",
            "hCaptchaResponse": "response",
            "refresh_token": "abc"
        }));

        assert_eq!(redacted["username"], "admin");
        assert_eq!(redacted["password"], REDACTION_MARKER);
        assert_eq!(redacted["hCaptchaResponse"], REDACTION_MARKER);
        assert_eq!(redacted["refresh_token"], REDACTION_MARKER);
    }

    #[test]
    fn redact_keeps_key_presence() {
        let redacted = redact(json!({"password": "secret"}));
        let keys: Vec<&String> = redacted.as_object().unwrap().keys().collect();
        assert_eq!(keys, ["password"]);
    }

    #[test]
    fn redact_recurses_into_nested_values() {
        let redacted = redact(json!({
            "request": {"body": {"Password": "secret"}},
            "attempts": [{"captcha": "x"}, {"note": "ok"}]
        }));

        assert_eq!(redacted["request"]["body"]["Password"], REDACTION_MARKER);
        assert_eq!(redacted["attempts"][0]["captcha"], REDACTION_MARKER);
        assert_eq!(redacted["attempts"][1]["note"], "ok");
    }

    #[test]
    fn redact_leaves_scalars_alone() {
        assert_eq!(redact(json!(42)), json!(42));
        assert_eq!(redact(json!("text")), json!("text"));
        assert_eq!(redact(json!(null)), json!(null));
    }

    #[tokio::test]
    async fn record_swallows_db_failure() {
        let pool = unreachable_pool();
        // Must not panic or propagate: auditing cannot block the request.
        record(&pool, None, "login_failed", json!({}), None, None).await;
    }

    #[tokio::test]
    async fn recent_errors_without_db() {
        let pool = unreachable_pool();
        assert!(recent(&pool, 10).await.is_err());
    }
}

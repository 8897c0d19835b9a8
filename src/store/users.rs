//! Credential store: the `users` table and its login-attempt counters.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::{Instrument, info, info_span};
use uuid::Uuid;

/// Identity record owned by the credential store.
///
/// Mutated on every login attempt (counter, lock, last-login); never deleted
/// in normal operation.
#[derive(Clone, Debug)]
pub struct UserRecord {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub role: String,
    pub failed_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_login: Option<DateTime<Utc>>,
}

/// Create the tables this service owns. Idempotent.
///
/// # Errors
/// Returns error when the statements cannot be executed.
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    let users = r"
        CREATE TABLE IF NOT EXISTS users (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            username TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'admin',
            failed_attempts INT NOT NULL DEFAULT 0,
            locked_until TIMESTAMPTZ,
            last_login TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
    ";
    let audit_logs = r"
        CREATE TABLE IF NOT EXISTS audit_logs (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            actor UUID REFERENCES users(id),
            action TEXT NOT NULL,
            details JSONB NOT NULL DEFAULT '{}'::jsonb,
            ip INET,
            user_agent TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
    ";

    for query in [users, audit_logs] {
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "CREATE TABLE",
            db.statement = query
        );
        sqlx::query(query)
            .execute(pool)
            .instrument(span)
            .await
            .context("failed to create schema")?;
    }

    Ok(())
}

/// Create the bootstrap admin account unless the username already exists.
///
/// # Errors
/// Returns error when the insert cannot be executed.
pub async fn bootstrap_admin(pool: &PgPool, username: &str, password_hash: &str) -> Result<()> {
    let query = r"
        INSERT INTO users (username, password_hash, role)
        VALUES ($1, $2, 'admin')
        ON CONFLICT (username) DO NOTHING
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(username)
        .bind(password_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to bootstrap admin user")?;

    if result.rows_affected() > 0 {
        info!(username, "Bootstrapped admin user");
    }

    Ok(())
}

/// Look up a user by username for the login flow.
///
/// # Errors
/// Returns error on database failure; a missing user is `Ok(None)`.
pub async fn fetch_by_username(pool: &PgPool, username: &str) -> Result<Option<UserRecord>> {
    let query = r"
        SELECT id, username, password_hash, role, failed_attempts, locked_until, last_login
        FROM users
        WHERE username = $1
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(username)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to fetch user")?;

    Ok(row.map(|row| UserRecord {
        id: row.get("id"),
        username: row.get("username"),
        password_hash: row.get("password_hash"),
        role: row.get("role"),
        failed_attempts: row.get("failed_attempts"),
        locked_until: row.get("locked_until"),
        last_login: row.get("last_login"),
    }))
}

/// Persist the counter and lock computed for a failed attempt.
///
/// Read-modify-write: the caller computed `attempts` from the row it fetched,
/// so two concurrent failures can under-count. Accepted at single-admin scale.
///
/// # Errors
/// Returns error when the update cannot be executed.
pub async fn record_failed_attempt(
    pool: &PgPool,
    user_id: Uuid,
    attempts: i32,
    locked_until: Option<DateTime<Utc>>,
) -> Result<()> {
    let query = r"
        UPDATE users
        SET failed_attempts = $2, locked_until = COALESCE($3, locked_until)
        WHERE id = $1
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(attempts)
        .bind(locked_until)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to record failed attempt")?;

    Ok(())
}

/// Reset counters and stamp the login time after a successful verification.
///
/// # Errors
/// Returns error when the update cannot be executed.
pub async fn record_successful_login(pool: &PgPool, user_id: Uuid) -> Result<()> {
    let query = r"
        UPDATE users
        SET failed_attempts = 0, locked_until = NULL, last_login = now()
        WHERE id = $1
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to record successful login")?;

    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
    use std::time::Duration;

    pub(crate) fn unreachable_pool() -> PgPool {
        let options = PgConnectOptions::new()
            .host("127.0.0.1")
            .port(1)
            .username("invalid")
            .database("invalid")
            .ssl_mode(PgSslMode::Disable);
        PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(200))
            .connect_lazy_with(options)
    }

    #[tokio::test]
    async fn fetch_by_username_errors_without_db() {
        let pool = unreachable_pool();
        assert!(fetch_by_username(&pool, "admin").await.is_err());
    }

    #[tokio::test]
    async fn record_failed_attempt_errors_without_db() {
        let pool = unreachable_pool();
        let result = record_failed_attempt(&pool, Uuid::new_v4(), 1, None).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn bootstrap_admin_errors_without_db() {
        let pool = unreachable_pool();
        assert!(bootstrap_admin(&pool, "admin", "hash").await.is_err());
    }
}

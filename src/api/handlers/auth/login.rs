//! Login endpoint: credential validation, lockout, captcha, token issuance.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{debug, error, instrument};

use super::middleware::request_context;
use super::state::{AuthState, PasswordVerifier};
use super::types::{
    AuthErrorResponse, LockedResponse, LoginRequest, LoginResponse, UserInfo, ACCOUNT_LOCKED,
    INVALID_CREDENTIALS,
};
use crate::lockout::{lock_for_attempts, LockState};
use crate::store::{audit, users, users::UserRecord};

/// Outcome of evaluating one login attempt against a stored user record.
#[derive(Debug)]
pub(crate) enum LoginDecision {
    /// Rejected before any password comparison.
    Locked { until: DateTime<Utc> },
    BadPassword {
        attempts: i32,
        locked_until: Option<DateTime<Utc>>,
    },
    Success,
}

/// Decide a login attempt. The lock check runs first: a locked account never
/// reaches the password comparator.
pub(crate) fn check_credentials(
    user: &UserRecord,
    password: &str,
    passwords: &dyn PasswordVerifier,
    now: DateTime<Utc>,
) -> LoginDecision {
    if let LockState::Locked { until } = LockState::evaluate(user.locked_until, now) {
        return LoginDecision::Locked { until };
    }

    if passwords.verify(password, &user.password_hash) {
        LoginDecision::Success
    } else {
        let attempts = user.failed_attempts + 1;
        LoginDecision::BadPassword {
            attempts,
            locked_until: lock_for_attempts(attempts, now),
        }
    }
}

fn valid_username(username: &str) -> bool {
    Regex::new(r"^[A-Za-z0-9_.-]{3,64}$").is_ok_and(|regex| regex.is_match(username))
}

fn valid_password(password: &str) -> bool {
    !password.is_empty() && password.len() <= 128
}

#[utoipa::path(
    post,
    path= "/api/auth/login",
    request_body = LoginRequest,
    responses (
        (status = 200, description = "Login successful", body = LoginResponse, content_type = "application/json"),
        (status = 400, description = "Invalid input or captcha", body = String),
        (status = 401, description = "Invalid credentials", body = AuthErrorResponse),
        (status = 423, description = "Account temporarily locked", body = LockedResponse),
    ),
    tag= "auth"
)]
#[instrument(skip(pool, state, payload))]
pub async fn login(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> Response {
    let request: LoginRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let context = request_context(&headers);
    let user_agent = context.user_agent.clone();

    if !valid_username(&request.username) {
        debug!("Invalid username format");

        return (StatusCode::BAD_REQUEST, "Invalid username".to_string()).into_response();
    }

    if !valid_password(&request.password) {
        debug!("Invalid password format");

        return (StatusCode::BAD_REQUEST, "Invalid password".to_string()).into_response();
    }

    if !state
        .captcha()
        .verify(request.captcha.as_deref(), context.ip)
        .await
    {
        audit::record(
            &pool,
            None,
            "login_failed",
            json!({"username": request.username, "reason": "captcha"}),
            context.ip,
            user_agent.as_deref(),
        )
        .await;

        return (StatusCode::BAD_REQUEST, "Invalid captcha".to_string()).into_response();
    }

    let user = match users::fetch_by_username(&pool, &request.username).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            debug!("User not found");

            audit::record(
                &pool,
                None,
                "login_failed",
                json!({"username": request.username, "reason": "unknown_user"}),
                context.ip,
                user_agent.as_deref(),
            )
            .await;

            return credential_failure(&state).await;
        }
        Err(err) => {
            error!("Error fetching user: {err:#}");

            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error processing login".to_string(),
            )
                .into_response();
        }
    };

    let now = Utc::now();
    match check_credentials(&user, &request.password, state.passwords(), now) {
        LoginDecision::Locked { until } => {
            audit::record(
                &pool,
                Some(user.id),
                "login_locked",
                json!({"username": user.username}),
                context.ip,
                user_agent.as_deref(),
            )
            .await;

            let retry_after = LockState::Locked { until }
                .retry_after_seconds(now)
                .unwrap_or(0);

            (
                StatusCode::LOCKED,
                Json(LockedResponse {
                    error: ACCOUNT_LOCKED.to_string(),
                    message: "Too many failed attempts, try again later".to_string(),
                    retry_after_seconds: retry_after,
                }),
            )
                .into_response()
        }

        LoginDecision::BadPassword {
            attempts,
            locked_until,
        } => {
            if let Err(err) =
                users::record_failed_attempt(&pool, user.id, attempts, locked_until).await
            {
                // The attempt still fails; a lost increment only weakens the
                // counter, which is already imprecise under concurrency.
                error!("Error recording failed attempt: {err:#}");
            }

            audit::record(
                &pool,
                Some(user.id),
                "login_failed",
                json!({"username": user.username, "attempts": attempts}),
                context.ip,
                user_agent.as_deref(),
            )
            .await;

            credential_failure(&state).await
        }

        LoginDecision::Success => {
            if let Err(err) = users::record_successful_login(&pool, user.id).await {
                error!("Error resetting login counters: {err:#}");

                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Error processing login".to_string(),
                )
                    .into_response();
            }

            let token = match state
                .tokens()
                .issue(user.id, &user.username, &user.role, &context)
            {
                Ok(token) => token,
                Err(err) => {
                    error!("Error issuing token: {err:#}");

                    return (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Error processing login".to_string(),
                    )
                        .into_response();
                }
            };

            audit::record(
                &pool,
                Some(user.id),
                "login",
                json!({"username": user.username}),
                context.ip,
                user_agent.as_deref(),
            )
            .await;

            debug!("Login successful");

            (
                StatusCode::OK,
                Json(LoginResponse {
                    token,
                    user: UserInfo {
                        id: user.id.to_string(),
                        username: user.username,
                        role: user.role,
                    },
                }),
            )
                .into_response()
        }
    }
}

/// Uniform credential failure: randomized delay, then the same generic 401
/// for unknown users and wrong passwords alike.
async fn credential_failure(state: &AuthState) -> Response {
    let delay = state.config().failure_delay();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    (
        StatusCode::UNAUTHORIZED,
        Json(AuthErrorResponse {
            error: INVALID_CREDENTIALS.to_string(),
            message: "Invalid username or password".to_string(),
            detail: None,
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lockout::{LOCK_DURATION_MINUTES, MAX_FAILED_ATTEMPTS};
    use chrono::Duration;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    /// Comparator that rejects everything and counts how often it ran.
    struct CountingVerifier {
        calls: AtomicUsize,
    }

    impl CountingVerifier {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl PasswordVerifier for CountingVerifier {
        fn verify(&self, _password: &str, _password_hash: &str) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            false
        }
    }

    struct AcceptingVerifier;

    impl PasswordVerifier for AcceptingVerifier {
        fn verify(&self, _password: &str, _password_hash: &str) -> bool {
            true
        }
    }

    fn user() -> UserRecord {
        UserRecord {
            id: Uuid::new_v4(),
            username: "admin".to_string(),
            password_hash: "hash".to_string(),
            role: "admin".to_string(),
            failed_attempts: 0,
            locked_until: None,
            last_login: None,
        }
    }

    #[test]
    fn valid_username_bounds() {
        assert!(valid_username("admin"));
        assert!(valid_username("blog.owner-01"));
        assert!(!valid_username("ab"));
        assert!(!valid_username("has space"));
        assert!(!valid_username(&"x".repeat(65)));
    }

    #[test]
    fn valid_password_bounds() {
        assert!(valid_password("hunter2"));
        assert!(!valid_password(""));
        assert!(!valid_password(&"x".repeat(129)));
    }

    #[test]
    fn fifth_failure_locks_sixth_skips_comparator() {
        // Property: exactly 5 failed comparisons transition to Locked; the
        // 6th attempt is rejected without another comparison.
        let verifier = CountingVerifier::new();
        let now = Utc::now();
        let mut user = user();

        for attempt in 1..=MAX_FAILED_ATTEMPTS {
            match check_credentials(&user, "wrong", &verifier, now) {
                LoginDecision::BadPassword {
                    attempts,
                    locked_until,
                } => {
                    assert_eq!(attempts, attempt);
                    if attempt == MAX_FAILED_ATTEMPTS {
                        assert!(locked_until.is_some());
                    } else {
                        assert!(locked_until.is_none());
                    }
                    // Mirror what the store persists.
                    user.failed_attempts = attempts;
                    user.locked_until = locked_until;
                }
                other => panic!("expected BadPassword, got {other:?}"),
            }
        }
        assert_eq!(verifier.calls(), MAX_FAILED_ATTEMPTS as usize);

        let decision = check_credentials(&user, "wrong", &verifier, now);
        assert!(matches!(decision, LoginDecision::Locked { .. }));
        assert_eq!(verifier.calls(), MAX_FAILED_ATTEMPTS as usize);
    }

    #[test]
    fn lock_expiry_reopens_password_evaluation() {
        let verifier = CountingVerifier::new();
        let now = Utc::now();
        let mut user = user();
        user.failed_attempts = MAX_FAILED_ATTEMPTS;
        user.locked_until = Some(now + Duration::minutes(LOCK_DURATION_MINUTES));

        // Before expiry: rejected without comparison.
        let decision = check_credentials(&user, "wrong", &verifier, now);
        assert!(matches!(decision, LoginDecision::Locked { .. }));
        assert_eq!(verifier.calls(), 0);

        // At expiry: normal evaluation resumes.
        let after = now + Duration::minutes(LOCK_DURATION_MINUTES);
        let decision = check_credentials(&user, "wrong", &verifier, after);
        assert!(matches!(decision, LoginDecision::BadPassword { .. }));
        assert_eq!(verifier.calls(), 1);
    }

    #[test]
    fn correct_password_succeeds_when_unlocked() {
        let now = Utc::now();
        let decision = check_credentials(&user(), "right", &AcceptingVerifier, now);
        assert!(matches!(decision, LoginDecision::Success));
    }

    #[test]
    fn correct_password_still_rejected_while_locked() {
        let now = Utc::now();
        let mut user = user();
        user.locked_until = Some(now + Duration::minutes(1));
        let decision = check_credentials(&user, "right", &AcceptingVerifier, now);
        assert!(matches!(decision, LoginDecision::Locked { .. }));
    }
}

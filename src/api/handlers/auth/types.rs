//! Request/response types for auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::token::Claims;

/// Bearer token missing from the `Authorization` header.
pub const NO_TOKEN: &str = "NO_TOKEN";

/// Signature, expiry, or revocation failure. One coarse category so callers
/// cannot distinguish the cause.
pub const INVALID_TOKEN: &str = "INVALID_TOKEN";

/// Bad username or bad password, indistinguishable on purpose.
pub const INVALID_CREDENTIALS: &str = "INVALID_CREDENTIALS";

pub const ACCOUNT_LOCKED: &str = "ACCOUNT_LOCKED";

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    #[serde(rename = "h-captcha-response", default)]
    pub captcha: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone)]
pub struct UserInfo {
    pub id: String,
    pub username: String,
    pub role: String,
}

impl From<&Claims> for UserInfo {
    fn from(claims: &Claims) -> Self {
        Self {
            id: claims.sub.clone(),
            username: claims.username.clone(),
            role: claims.role.clone(),
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserInfo,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyResponse {
    pub valid: bool,
    pub user: UserInfo,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LogoutResponse {
    pub message: String,
    pub user: UserInfo,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AuthErrorResponse {
    /// Coarse machine-readable category (`NO_TOKEN`, `INVALID_TOKEN`,
    /// `INVALID_CREDENTIALS`).
    pub error: String,
    pub message: String,
    /// Diagnostic cause, included in debug builds only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LockedResponse {
    pub error: String,
    pub message: String,
    pub retry_after_seconds: i64,
}

/// Role names are not secret, so authorization failures spell out both sides.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RoleErrorResponse {
    pub error: String,
    pub required: String,
    pub current: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use serde_json::json;

    #[test]
    fn login_request_reads_hcaptcha_field() -> Result<()> {
        let request: LoginRequest = serde_json::from_value(json!({
            "username": "admin",
            "password": "hunter2",
            "h-captcha-response": "captcha-token"
        }))?;
        assert_eq!(request.username, "admin");
        assert_eq!(request.captcha.as_deref(), Some("captcha-token"));
        Ok(())
    }

    #[test]
    fn login_request_captcha_is_optional() -> Result<()> {
        let request: LoginRequest = serde_json::from_value(json!({
            "username": "admin",
            "password": "hunter2"
        }))?;
        assert!(request.captcha.is_none());
        Ok(())
    }

    #[test]
    fn auth_error_hides_missing_detail() -> Result<()> {
        let body = AuthErrorResponse {
            error: INVALID_TOKEN.to_string(),
            message: "Invalid or expired token".to_string(),
            detail: None,
        };
        let value = serde_json::to_value(&body)?;
        assert!(value.get("detail").is_none());
        assert_eq!(value["error"], INVALID_TOKEN);
        Ok(())
    }
}

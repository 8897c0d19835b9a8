//! Bearer token issuance and verification.
//!
//! Tokens are HS256 JWTs with a fixed 30-minute lifetime measured from
//! issuance. There is no server-side sliding expiry: clients may extend their
//! own mirrored session, the signed `exp` claim never moves.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use uuid::Uuid;

pub mod revocation;

pub const TOKEN_TTL_SECONDS: i64 = 30 * 60;
pub const TOKEN_ISSUER: &str = "quill";
pub const TOKEN_AUDIENCE: &str = "quill-admin";

/// User-agent fragment carried in the token, first 100 characters only.
const USER_AGENT_MAX_CHARS: usize = 100;

/// Claims carried by an issued token.
///
/// `ip` and `ua` describe the request the token was issued to; on later
/// requests an IP mismatch is logged, never rejected (legitimate mobile
/// clients rotate IPs).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub username: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
    pub ip: Option<IpAddr>,
    pub ua: Option<String>,
}

/// Where a request came from, as far as the token cares.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    pub ip: Option<IpAddr>,
    pub user_agent: Option<String>,
}

pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenService {
    #[must_use]
    pub fn new(secret: &SecretString) -> Self {
        let secret = secret.expose_secret().as_bytes();

        let mut validation = Validation::new(Algorithm::HS256);
        // The 30-minute lifetime is exact; the default 60s leeway would let
        // expired tokens linger.
        validation.leeway = 0;
        validation.set_issuer(&[TOKEN_ISSUER]);
        validation.set_audience(&[TOKEN_AUDIENCE]);

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Issue a signed token for a validated user.
    ///
    /// # Errors
    /// Signing only fails on a malformed key, which is caught at startup.
    pub fn issue(
        &self,
        user_id: Uuid,
        username: &str,
        role: &str,
        context: &RequestContext,
    ) -> Result<String> {
        self.issue_at(Utc::now(), user_id, username, role, context)
    }

    pub(crate) fn issue_at(
        &self,
        issued_at: DateTime<Utc>,
        user_id: Uuid,
        username: &str,
        role: &str,
        context: &RequestContext,
    ) -> Result<String> {
        let iat = issued_at.timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            username: username.to_string(),
            role: role.to_string(),
            iat,
            exp: iat + TOKEN_TTL_SECONDS,
            iss: TOKEN_ISSUER.to_string(),
            aud: TOKEN_AUDIENCE.to_string(),
            ip: context.ip,
            ua: context
                .user_agent
                .as_deref()
                .map(|ua| ua.chars().take(USER_AGENT_MAX_CHARS).collect()),
        };

        jsonwebtoken::encode(&Header::default(), &claims, &self.encoding)
            .context("failed to sign token")
    }

    /// Validate signature, issuer, audience, and expiry in one step.
    ///
    /// # Errors
    /// Any mismatch or past expiry rejects the token. Callers collapse the
    /// cause into a single `INVALID_TOKEN` response.
    pub fn decode(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
    }
}

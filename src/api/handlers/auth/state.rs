//! Auth configuration and shared request state.

use rand::Rng;
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use super::captcha::CaptchaVerifier;
use crate::token::{revocation::RevocationStore, Claims, TokenService};

/// Capability every administrative endpoint requires. The bootstrap account
/// is the only configured holder.
pub const ADMIN_CAPABILITY: &str = "admin";

const DEFAULT_FAILURE_DELAY_MS: (u64, u64) = (1000, 3000);

#[derive(Clone, Debug)]
pub struct AuthConfig {
    failure_delay_ms: (u64, u64),
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            failure_delay_ms: DEFAULT_FAILURE_DELAY_MS,
        }
    }

    /// Override the artificial delay applied to credential failures.
    /// `(0, 0)` disables it (tests).
    #[must_use]
    pub fn with_failure_delay_ms(mut self, min: u64, max: u64) -> Self {
        self.failure_delay_ms = (min, max);
        self
    }

    /// Randomized delay served before a credential failure, blunting
    /// timing-based enumeration of usernames.
    #[must_use]
    pub fn failure_delay(&self) -> Duration {
        let (min, max) = self.failure_delay_ms;
        if max == 0 || max <= min {
            return Duration::from_millis(min);
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Compare a password against a stored bcrypt hash.
///
/// A trait so the login flow can be exercised with a counting mock.
pub trait PasswordVerifier: Send + Sync {
    fn verify(&self, password: &str, password_hash: &str) -> bool;
}

#[derive(Clone, Debug)]
pub struct BcryptVerifier;

impl PasswordVerifier for BcryptVerifier {
    fn verify(&self, password: &str, password_hash: &str) -> bool {
        bcrypt::verify(password, password_hash).unwrap_or(false)
    }
}

/// Capabilities granted by a role.
///
/// Storage keeps a single flat role string; the check goes through a set so
/// it can grow without touching call sites. "admin" grants exactly
/// `{"admin"}` today.
#[derive(Clone, Debug)]
pub struct Capabilities(HashSet<String>);

impl Capabilities {
    #[must_use]
    pub fn from_role(role: &str) -> Self {
        let mut capabilities = HashSet::new();
        let role = role.trim();
        if !role.is_empty() {
            capabilities.insert(role.to_string());
        }
        Self(capabilities)
    }

    #[must_use]
    pub fn has(&self, capability: &str) -> bool {
        self.0.contains(capability)
    }
}

/// Why a presented bearer token was rejected.
///
/// Both variants surface to the caller as the same `INVALID_TOKEN` category.
#[derive(Debug)]
pub enum VerifyError {
    Invalid(String),
    Revoked,
}

impl VerifyError {
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            Self::Invalid(cause) => cause.clone(),
            Self::Revoked => "token revoked".to_string(),
        }
    }
}

/// Session manager state: token service, revocation registry, password and
/// captcha verifiers, shared through an axum `Extension`.
pub struct AuthState {
    config: AuthConfig,
    tokens: TokenService,
    revocation: Arc<dyn RevocationStore>,
    passwords: Arc<dyn PasswordVerifier>,
    captcha: CaptchaVerifier,
}

impl AuthState {
    pub fn new(
        config: AuthConfig,
        tokens: TokenService,
        revocation: Arc<dyn RevocationStore>,
        passwords: Arc<dyn PasswordVerifier>,
        captcha: CaptchaVerifier,
    ) -> Self {
        Self {
            config,
            tokens,
            revocation,
            passwords,
            captcha,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    #[must_use]
    pub fn revocation(&self) -> &dyn RevocationStore {
        self.revocation.as_ref()
    }

    pub(crate) fn passwords(&self) -> &dyn PasswordVerifier {
        self.passwords.as_ref()
    }

    #[must_use]
    pub fn captcha(&self) -> &CaptchaVerifier {
        &self.captcha
    }

    /// Verify signature, issuer, audience, and expiry, then check the
    /// revocation registry.
    ///
    /// An IP different from the one at issuance is logged, never rejected:
    /// legitimate mobile clients rotate IPs mid-session.
    ///
    /// # Errors
    /// Returns `VerifyError` for any invalid or revoked token.
    pub fn verify_bearer(
        &self,
        token: &str,
        current_ip: Option<IpAddr>,
    ) -> Result<Claims, VerifyError> {
        let claims = self
            .tokens
            .decode(token)
            .map_err(|err| VerifyError::Invalid(err.to_string()))?;

        if self.revocation.is_revoked(token) {
            return Err(VerifyError::Revoked);
        }

        if let (Some(issued_ip), Some(current_ip)) = (claims.ip, current_ip) {
            if issued_ip != current_ip {
                warn!(
                    username = %claims.username,
                    %issued_ip,
                    %current_ip,
                    "Token presented from a different IP than issuance"
                );
            }
        }

        Ok(claims)
    }
}

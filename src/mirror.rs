//! Client-held mirror of the server session.
//!
//! Browser and desktop frontends persist this record locally to decide which
//! page to show without a round-trip. It is a UI-routing cache only: the
//! server's own verification is the source of truth, and every privileged
//! action still presents the bearer token.
//!
//! User activity extends the *client* expiry only. The server token keeps its
//! fixed 30-minute `exp`, so a mirror can read as active while the next API
//! call fails verification and forces a re-login.

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use rand::{RngCore, rngs::OsRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::token::TOKEN_TTL_SECONDS;

/// Warning fires this long before the client-computed expiry.
const WARNING_WINDOW_SECONDS: i64 = 5 * 60;

/// Environment traits the fingerprint is derived from.
///
/// A changed fingerprint on read means the stored record was moved or edited.
/// Best-effort tamper signal, not a security boundary.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FingerprintInput {
    pub user_agent: String,
    pub language: String,
    pub screen_width: u32,
    pub screen_height: u32,
    pub timezone_offset_minutes: i32,
    pub canvas_hash: String,
}

impl FingerprintInput {
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.user_agent.as_bytes());
        hasher.update(self.language.as_bytes());
        hasher.update(self.screen_width.to_le_bytes());
        hasher.update(self.screen_height.to_le_bytes());
        hasher.update(self.timezone_offset_minutes.to_le_bytes());
        hasher.update(self.canvas_hash.as_bytes());
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MirrorStatus {
    Active,
    /// Inside the 5-minute warning window before the client expiry.
    ExpiringSoon,
    Expired,
}

/// Locally persisted session record, serialized to JSON by the frontend.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionMirror {
    pub token: String,
    pub username: String,
    pub role: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub csrf_token: String,
    fingerprint: String,
}

impl SessionMirror {
    /// Build a fresh mirror from a successful login response.
    ///
    /// # Errors
    /// Fails only if the system RNG cannot produce the CSRF placeholder.
    pub fn new(
        token: String,
        username: String,
        role: String,
        environment: &FingerprintInput,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        Ok(Self {
            token,
            username,
            role,
            issued_at: now,
            expires_at: now + Duration::seconds(TOKEN_TTL_SECONDS),
            csrf_token: generate_csrf_token()?,
            fingerprint: environment.fingerprint(),
        })
    }

    /// Recompute the fingerprint on read; a mismatch means the record must be
    /// discarded and the user sent back to login.
    #[must_use]
    pub fn matches_environment(&self, environment: &FingerprintInput) -> bool {
        self.fingerprint == environment.fingerprint()
    }

    #[must_use]
    pub fn status(&self, now: DateTime<Utc>) -> MirrorStatus {
        if now >= self.expires_at {
            MirrorStatus::Expired
        } else if now + Duration::seconds(WARNING_WINDOW_SECONDS) >= self.expires_at {
            MirrorStatus::ExpiringSoon
        } else {
            MirrorStatus::Active
        }
    }

    /// Register user activity (pointer, key, scroll, touch).
    ///
    /// Restarts the client expiry window. The server-issued token is not
    /// extended, so verification can still fail after a touch.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.expires_at = now + Duration::seconds(TOKEN_TTL_SECONDS);
    }
}

fn generate_csrf_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate CSRF token")?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

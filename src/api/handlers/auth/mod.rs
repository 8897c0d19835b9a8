//! Auth handlers and supporting modules.
//!
//! The session lifecycle lives here: login issues a 30-minute bearer token,
//! the authenticate layer verifies it on every protected request, logout adds
//! it to the revocation registry. Lockout counters are persisted in the
//! credential store so they survive restarts.
//!
//! Deployment constraint: the default revocation registry is in-memory and
//! process-local. Run a single instance, or inject a shared store.

pub(crate) mod captcha;
pub(crate) mod login;
pub(crate) mod logout;
pub(crate) mod middleware;
mod state;
pub(crate) mod types;
pub(crate) mod verify;

pub use captcha::CaptchaVerifier;
pub use state::{AuthConfig, AuthState, BcryptVerifier, Capabilities, PasswordVerifier};

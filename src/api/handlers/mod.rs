pub(crate) mod admin;
pub(crate) mod auth;
pub(crate) mod health;

pub use auth::{AuthConfig, AuthState, BcryptVerifier, CaptchaVerifier};

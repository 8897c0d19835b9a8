//! hCaptcha verification for the login form.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::net::IpAddr;
use tracing::{debug, warn};

const SITEVERIFY_URL: &str = "https://api.hcaptcha.com/siteverify";

#[derive(Deserialize)]
struct SiteverifyResponse {
    success: bool,
    #[serde(rename = "error-codes", default)]
    error_codes: Vec<String>,
}

/// Server-side captcha check against the hCaptcha `siteverify` endpoint.
///
/// Without a configured secret the check is disabled and accepts anything
/// (local development). Transport failures fail closed: a login is rejected
/// rather than admitted unverified.
pub struct CaptchaVerifier {
    secret: Option<SecretString>,
    endpoint: String,
    client: reqwest::Client,
}

impl CaptchaVerifier {
    #[must_use]
    pub fn new(secret: Option<SecretString>) -> Self {
        Self {
            secret,
            endpoint: SITEVERIFY_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    #[must_use]
    pub fn disabled() -> Self {
        Self::new(None)
    }

    #[cfg(test)]
    pub(crate) fn with_endpoint(mut self, endpoint: String) -> Self {
        self.endpoint = endpoint;
        self
    }

    pub async fn verify(&self, response: Option<&str>, remote_ip: Option<IpAddr>) -> bool {
        let Some(secret) = &self.secret else {
            debug!("Captcha verification disabled, accepting response");
            return true;
        };

        let Some(response) = response.map(str::trim).filter(|r| !r.is_empty()) else {
            return false;
        };

        let mut form = vec![
            ("secret", secret.expose_secret().to_string()),
            ("response", response.to_string()),
        ];
        if let Some(ip) = remote_ip {
            form.push(("remoteip", ip.to_string()));
        }

        let result = self
            .client
            .post(&self.endpoint)
            .form(&form)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status);

        let verdict = match result {
            Ok(response) => response.json::<SiteverifyResponse>().await,
            Err(err) => {
                warn!("Captcha verification request failed: {err}");
                return false;
            }
        };

        match verdict {
            Ok(verdict) => {
                if !verdict.success {
                    debug!(error_codes = ?verdict.error_codes, "Captcha rejected");
                }
                verdict.success
            }
            Err(err) => {
                warn!("Captcha verification returned malformed payload: {err}");
                false
            }
        }
    }
}

use crate::{
    cli::globals::GlobalArgs,
    store::users,
    token::{revocation::InMemoryRevocationStore, TokenService},
};
use anyhow::{anyhow, Context, Result};
use axum::{
    body::Body,
    extract::{Extension, MatchedPath},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    middleware,
    routing::{get, post},
    Router,
};
use secrecy::ExposeSecret;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use url::Url;

pub(crate) mod handlers;
mod openapi;

pub use handlers::{AuthConfig, AuthState, BcryptVerifier, CaptchaVerifier};

use handlers::{admin, auth, health};

pub static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

/// Build the application router around a connected pool and auth state.
#[must_use]
pub fn app(pool: PgPool, auth_state: Arc<AuthState>, frontend_origin: HeaderValue) -> Router {
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(AllowOrigin::exact(frontend_origin))
        .allow_credentials(true);

    // Bearer-protected routes; the authenticate layer attaches claims and the
    // raw token, require_admin must run after it.
    let protected = Router::new()
        .route("/api/auth/verify", get(auth::verify::verify))
        .route("/api/auth/logout", post(auth::logout::logout))
        .route_layer(middleware::from_fn(auth::middleware::authenticate));

    let admin_routes = Router::new()
        .route("/api/admin/audit", get(admin::audit_log))
        .route_layer(middleware::from_fn(auth::middleware::require_admin))
        .route_layer(middleware::from_fn(auth::middleware::authenticate));

    Router::new()
        .route("/api/auth/login", post(auth::login::login))
        .merge(protected)
        .merge(admin_routes)
        .route("/health", get(health::health))
        .route("/openapi.json", get(openapi::openapi_json))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(auth_state))
                .layer(Extension(pool)),
        )
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, dsn: String, globals: &GlobalArgs) -> Result<()> {
    // Connect to database
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    users::ensure_schema(&pool)
        .await
        .context("Failed to create schema")?;

    let password_hash = bcrypt::hash(
        globals.admin_password.expose_secret(),
        bcrypt::DEFAULT_COST,
    )
    .context("Failed to hash bootstrap admin password")?;
    users::bootstrap_admin(&pool, &globals.admin_username, &password_hash).await?;

    let auth_state = Arc::new(AuthState::new(
        AuthConfig::new(),
        TokenService::new(&globals.token_secret),
        Arc::new(InMemoryRevocationStore::new()),
        Arc::new(BcryptVerifier),
        CaptchaVerifier::new(globals.hcaptcha_secret.clone()),
    ));

    let origin = frontend_origin(&globals.site_url)?;
    let app = app(pool, auth_state, origin);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

fn frontend_origin(site_url: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(site_url).with_context(|| format!("Invalid site URL: {site_url}"))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| anyhow!("Site URL must include a valid host: {site_url}"))?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build frontend origin header")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frontend_origin_strips_path() -> Result<()> {
        let origin = frontend_origin("https://quill.blog/some/path")?;
        assert_eq!(origin, HeaderValue::from_static("https://quill.blog"));
        Ok(())
    }

    #[test]
    fn frontend_origin_keeps_port() -> Result<()> {
        let origin = frontend_origin("http://localhost:3000")?;
        assert_eq!(origin, HeaderValue::from_static("http://localhost:3000"));
        Ok(())
    }

    #[test]
    fn frontend_origin_rejects_garbage() {
        assert!(frontend_origin("not a url").is_err());
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}

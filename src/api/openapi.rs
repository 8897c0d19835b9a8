//! OpenAPI document for the auth API, served at `/openapi.json`.

use axum::response::Json;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use super::handlers::{admin, auth, health};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        auth::login::login,
        auth::logout::logout,
        auth::verify::verify,
        admin::audit_log,
    ),
    components(schemas(
        health::Health,
        auth::types::LoginRequest,
        auth::types::LoginResponse,
        auth::types::LogoutResponse,
        auth::types::VerifyResponse,
        auth::types::AuthErrorResponse,
        auth::types::LockedResponse,
        auth::types::RoleErrorResponse,
        auth::types::UserInfo,
        crate::store::audit::AuditEntry,
    )),
    modifiers(&BearerSecurity),
    tags(
        (name = "auth", description = "Login, logout, and token verification"),
        (name = "admin", description = "Admin-only blog management endpoints"),
        (name = "health", description = "Service health"),
    )
)]
pub struct ApiDoc;

struct BearerSecurity;

impl Modify for BearerSecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_auth_paths() {
        let doc = ApiDoc::openapi();
        let paths = &doc.paths.paths;
        assert!(paths.contains_key("/api/auth/login"));
        assert!(paths.contains_key("/api/auth/logout"));
        assert!(paths.contains_key("/api/auth/verify"));
        assert!(paths.contains_key("/api/admin/audit"));
        assert!(paths.contains_key("/health"));
    }

    #[test]
    fn document_registers_bearer_scheme() {
        let doc = ApiDoc::openapi();
        let components = doc.components.expect("components should be present");
        assert!(components.security_schemes.contains_key("bearer"));
    }
}

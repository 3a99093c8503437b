//! # OpenAPI Specification Assembly
//!
//! Assembles all utoipa-documented routes into a single OpenAPI spec,
//! served at `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::state::AppState;

/// Adds Bearer token security scheme to the OpenAPI spec.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .description(Some(
                            "`{role}:{user_id}:{secret}` or the bare secret (operator). \
                             The secret is set via the AUTH_TOKEN env var.",
                        ))
                        .build(),
                ),
            );
        }
    }
}

/// Assembled OpenAPI spec for the entire API surface.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "DirectivesPlus API",
        version = "0.1.0",
        description = "Institution access to patients' advance directives.\n\nProvides:\n- **Institution access validation**: code lookup, profile matching, document retrieval, audit\n- **Dossiers** assembled after a grant, retrievable until they expire\n- **Directive and institution code management** for patients\n- **Auth relay** to the managed platform (password, email OTP, refresh)\n\nAuthentication: `Authorization: Bearer <token>`. Health checks, `/metrics` and `/v1/auth/*` are unauthenticated."
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development server"),
    ),
    security(
        ("bearer_auth" = [])
    ),
    paths(
        crate::routes::access::validate_access,
        crate::routes::access::get_dossier,
        crate::routes::directives::create_directive,
        crate::routes::directives::list_directives,
        crate::routes::directives::regenerate_code,
        crate::routes::documents::list_documents,
        crate::routes::documents::delete_document,
        crate::routes::auth::send_otp,
        crate::routes::auth::verify_otp,
        crate::routes::auth::refresh,
        crate::routes::auth::password_sign_in,
    ),
    components(schemas(
        crate::error::ErrorBody,
        crate::error::ErrorDetail,
        crate::access::AccessRequest,
        crate::access::ValidationPath,
        crate::access::ValidationStrategy,
        crate::routes::access::AccessResponse,
        crate::dossier::Dossier,
        crate::dossier::DossierDirective,
        crate::routes::directives::CreateDirectiveRequest,
        crate::routes::directives::DirectiveResponse,
        crate::routes::directives::AccessCard,
        crate::routes::auth::OtpRequest,
        crate::routes::auth::OtpResponse,
        crate::routes::auth::VerifyOtpRequest,
        crate::routes::auth::RefreshRequest,
        crate::routes::auth::PasswordRequest,
        crate::routes::auth::SessionResponse,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "institution-access", description = "Institution code validation and dossiers"),
        (name = "directives", description = "Directives and institution codes"),
        (name = "documents", description = "PDF and medical documents"),
        (name = "auth", description = "Relay to the platform auth endpoints"),
    )
)]
pub struct ApiDoc;

/// Router serving the OpenAPI spec.
pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

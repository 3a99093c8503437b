//! # Authentication Relay Routes
//!
//! Thin relay to the platform's auth surface so the web client talks to one
//! origin. These run before the caller has a session, so they are mounted
//! outside the authentication middleware. OTP sends are throttled per
//! email address.
//!
//! Credential failures reported by the platform become 401; anything else
//! the platform does wrong becomes 502.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use dplus_core::validate_email;
use dplus_platform_client::{PlatformClient, PlatformError, Session};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::access::messages;
use crate::error::AppError;
use crate::extractors::{extract_validated_json, require_text, Validate};
use crate::middleware::rate_limit::AttemptKind;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/auth/otp", post(send_otp))
        .route("/v1/auth/otp/verify", post(verify_otp))
        .route("/v1/auth/refresh", post(refresh))
        .route("/v1/auth/password", post(password_sign_in))
}

fn require_platform(state: &AppState) -> Result<&PlatformClient, AppError> {
    state.platform.as_ref().ok_or_else(|| {
        AppError::service_unavailable(
            "Platform client not configured. Set PLATFORM_URL and PLATFORM_ANON_KEY.",
        )
    })
}

fn relay_error(operation: &str, err: PlatformError) -> AppError {
    match err.status() {
        Some(400 | 401 | 403 | 422) => {
            tracing::warn!(operation, "platform rejected credentials: {err}");
            AppError::Unauthorized("invalid credentials".into())
        }
        _ => AppError::upstream(format!("{operation}: {err}")),
    }
}

// -- Request / Response types -------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct OtpRequest {
    pub email: String,
}

impl Validate for OtpRequest {
    fn validate(&self) -> Result<(), String> {
        validate_email(&self.email).map(|_| ()).map_err(|e| e.to_string())
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OtpResponse {
    pub sent: bool,
    pub message_id: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyOtpRequest {
    pub email: String,
    pub token: String,
}

impl Validate for VerifyOtpRequest {
    fn validate(&self) -> Result<(), String> {
        validate_email(&self.email).map_err(|e| e.to_string())?;
        require_text("token", &self.token)
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

impl Validate for RefreshRequest {
    fn validate(&self) -> Result<(), String> {
        if self.refresh_token.trim().is_empty() {
            return Err("refresh_token must not be empty".into());
        }
        Ok(())
    }
}

#[derive(Deserialize, ToSchema)]
pub struct PasswordRequest {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for PasswordRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordRequest")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

impl Validate for PasswordRequest {
    fn validate(&self) -> Result<(), String> {
        validate_email(&self.email).map_err(|e| e.to_string())?;
        if self.password.is_empty() {
            return Err("password must not be empty".into());
        }
        Ok(())
    }
}

/// Session issued by the platform.
#[derive(Serialize, ToSchema)]
pub struct SessionResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
    pub token_type: String,
    pub user_id: String,
    pub email: Option<String>,
}

impl From<Session> for SessionResponse {
    fn from(session: Session) -> Self {
        Self {
            access_token: session.access_token,
            refresh_token: session.refresh_token,
            expires_in: session.expires_in,
            token_type: session.token_type.unwrap_or_else(|| "bearer".into()),
            user_id: session.user.id.to_string(),
            email: session.user.email,
        }
    }
}

// -- Handlers -----------------------------------------------------------------

/// POST /v1/auth/otp — Email a one-time password.
#[utoipa::path(
    post,
    path = "/v1/auth/otp",
    request_body = OtpRequest,
    responses(
        (status = 200, description = "OTP email sent", body = OtpResponse),
        (status = 422, description = "Invalid email", body = crate::error::ErrorBody),
        (status = 429, description = "Too many OTP requests", body = crate::error::ErrorBody),
        (status = 503, description = "Platform not configured", body = crate::error::ErrorBody),
    ),
    tag = "auth"
)]
async fn send_otp(
    State(state): State<AppState>,
    body: Result<Json<OtpRequest>, JsonRejection>,
) -> Result<Json<OtpResponse>, AppError> {
    let req = extract_validated_json(body)?;
    let platform = require_platform(&state)?;
    let email = validate_email(&req.email)?;

    if let Err(retry_after) = state.limiter.check(AttemptKind::OtpEmail, &email) {
        tracing::warn!("OTP send rate limit exceeded");
        return Err(AppError::TooManyRequests {
            message: messages::rate_limited(retry_after.secs()),
            retry_after_secs: retry_after.secs(),
        });
    }

    let receipt = platform
        .functions()
        .send_otp_email(&email)
        .await
        .map_err(|e| relay_error("send_otp_email", e))?;

    Ok(Json(OtpResponse {
        sent: receipt.success,
        message_id: receipt.message_id,
    }))
}

/// POST /v1/auth/otp/verify — Exchange an OTP for a session.
#[utoipa::path(
    post,
    path = "/v1/auth/otp/verify",
    request_body = VerifyOtpRequest,
    responses(
        (status = 200, description = "Session", body = SessionResponse),
        (status = 401, description = "Wrong or expired OTP", body = crate::error::ErrorBody),
        (status = 503, description = "Platform not configured", body = crate::error::ErrorBody),
    ),
    tag = "auth"
)]
async fn verify_otp(
    State(state): State<AppState>,
    body: Result<Json<VerifyOtpRequest>, JsonRejection>,
) -> Result<Json<SessionResponse>, AppError> {
    let req = extract_validated_json(body)?;
    let platform = require_platform(&state)?;
    let email = validate_email(&req.email)?;

    let session = platform
        .auth()
        .verify_otp(&email, req.token.trim())
        .await
        .map_err(|e| relay_error("verify_otp", e))?;
    Ok(Json(session.into()))
}

/// POST /v1/auth/refresh — Refresh a session.
#[utoipa::path(
    post,
    path = "/v1/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Session", body = SessionResponse),
        (status = 401, description = "Refresh token rejected", body = crate::error::ErrorBody),
        (status = 503, description = "Platform not configured", body = crate::error::ErrorBody),
    ),
    tag = "auth"
)]
async fn refresh(
    State(state): State<AppState>,
    body: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<Json<SessionResponse>, AppError> {
    let req = extract_validated_json(body)?;
    let platform = require_platform(&state)?;

    let session = platform
        .auth()
        .refresh_session(req.refresh_token.trim())
        .await
        .map_err(|e| relay_error("refresh_session", e))?;
    Ok(Json(session.into()))
}

/// POST /v1/auth/password — Sign in with email and password.
#[utoipa::path(
    post,
    path = "/v1/auth/password",
    request_body = PasswordRequest,
    responses(
        (status = 200, description = "Session", body = SessionResponse),
        (status = 401, description = "Wrong credentials", body = crate::error::ErrorBody),
        (status = 503, description = "Platform not configured", body = crate::error::ErrorBody),
    ),
    tag = "auth"
)]
async fn password_sign_in(
    State(state): State<AppState>,
    body: Result<Json<PasswordRequest>, JsonRejection>,
) -> Result<Json<SessionResponse>, AppError> {
    let req = extract_validated_json(body)?;
    let platform = require_platform(&state)?;
    let email = validate_email(&req.email)?;

    let session = platform
        .auth()
        .sign_in_with_password(&email, &req.password)
        .await
        .map_err(|e| relay_error("sign_in_with_password", e))?;
    Ok(Json(session.into()))
}

//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Maps validation, directory, platform and access-flow errors to HTTP
//! status codes with a JSON body `{ "error": { code, message, details? } }`.
//! Internal error details are never returned to clients.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use dplus_core::AccessOutcome;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::access::{messages, AccessFailure};
use crate::directory::DirectoryError;
use crate::dossier::CipherError;

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "INVALID_CODE", "VALIDATION_ERROR").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Additional details, present only for client errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Request validation failed (422).
    #[error("validation error: {0}")]
    Validation(String),

    /// Request body could not be parsed (422).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing or invalid credentials (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Insufficient permissions (403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Conflict with current resource state (409).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Too many attempts (429).
    #[error("rate limited: {message}")]
    TooManyRequests {
        message: String,
        retry_after_secs: u64,
    },

    /// Internal server error (500). Message is logged but not returned to client.
    #[error("internal error: {0}")]
    Internal(String),

    /// The managed backend returned an error or is unreachable (502).
    #[error("upstream platform error: {0}")]
    UpstreamError(String),

    /// Service dependency not configured (503).
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Institution access refused. Status depends on the outcome.
    #[error("access refused: {failure}")]
    Access {
        failure: AccessFailure,
        /// Whether the attempt reached every audit sink.
        audit_recorded: bool,
    },
}

impl AppError {
    /// Return the HTTP status code and machine-readable error code for this error.
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            Self::BadRequest(_) => (StatusCode::UNPROCESSABLE_ENTITY, "BAD_REQUEST"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Self::TooManyRequests { .. } => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            Self::UpstreamError(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
            Self::ServiceUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE"),
            Self::Access { failure, .. } => match failure.outcome() {
                AccessOutcome::InvalidCode => (StatusCode::NOT_FOUND, "INVALID_CODE"),
                AccessOutcome::ExpiredCode => (StatusCode::GONE, "EXPIRED_CODE"),
                AccessOutcome::ProfileMismatch => (StatusCode::FORBIDDEN, "PROFILE_MISMATCH"),
                AccessOutcome::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED"),
                AccessOutcome::TechnicalError | AccessOutcome::Granted => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "TECHNICAL_ERROR")
                }
            },
        }
    }

    /// Construct an upstream error (502 Bad Gateway).
    pub fn upstream(msg: String) -> Self {
        Self::UpstreamError(msg)
    }

    /// Construct a service unavailable error (503).
    pub fn service_unavailable(msg: &str) -> Self {
        Self::ServiceUnavailable(msg.to_string())
    }

    /// Construct a not-found error (404).
    pub fn not_found(msg: String) -> Self {
        Self::NotFound(msg)
    }

    fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::TooManyRequests {
                retry_after_secs, ..
            } => Some(*retry_after_secs),
            Self::Access {
                failure: AccessFailure::RateLimited { retry_after_secs },
                ..
            } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let retry_after = self.retry_after_secs();

        match &self {
            Self::Internal(_) => tracing::error!(error = %self, "internal server error"),
            Self::UpstreamError(_) => tracing::error!(error = %self, "upstream platform error"),
            Self::ServiceUnavailable(_) => tracing::warn!(error = %self, "service unavailable"),
            Self::Access {
                failure: AccessFailure::Technical(_),
                ..
            } => tracing::error!(error = %self, "access validation technical error"),
            _ => {}
        }

        let (message, details) = match &self {
            Self::Internal(_) => ("An internal error occurred".to_string(), None),
            Self::UpstreamError(_) => ("An upstream service error occurred".to_string(), None),
            Self::TooManyRequests {
                message,
                retry_after_secs,
            } => (
                message.clone(),
                Some(serde_json::json!({ "retry_after_secs": retry_after_secs })),
            ),
            Self::Access {
                failure,
                audit_recorded,
            } => {
                let user_message = messages::for_failure(failure);
                let mut details = serde_json::json!({
                    "outcome": failure.outcome(),
                    "audit_recorded": audit_recorded,
                });
                if !user_message.hints.is_empty() {
                    details["hints"] = serde_json::json!(user_message.hints);
                }
                if let Some(secs) = retry_after {
                    details["retry_after_secs"] = serde_json::json!(secs);
                }
                (user_message.message, Some(details))
            }
            other => (other.to_string(), None),
        };

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details,
            },
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

impl From<dplus_core::ValidationError> for AppError {
    fn from(err: dplus_core::ValidationError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<DirectoryError> for AppError {
    fn from(err: DirectoryError) -> Self {
        Self::UpstreamError(err.to_string())
    }
}

impl From<CipherError> for AppError {
    fn from(err: CipherError) -> Self {
        Self::Internal(err.to_string())
    }
}

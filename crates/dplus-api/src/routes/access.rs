//! # Institution Access Routes
//!
//! A healthcare professional submits a patient's institution code with the
//! patient's name and birth date. On a grant, one dossier per matched
//! patient is assembled and returned; each stays retrievable by id until
//! its time-to-live runs out.
//!
//! Refusals are returned as errors with a French message and, for a
//! profile mismatch, hints. Every response states whether the attempt
//! reached the audit log.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use dplus_core::AccessOutcome;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::access::{messages, AccessRequest, ValidationPath};
use crate::auth::{require_role, CallerIdentity, Role};
use crate::dossier::Dossier;
use crate::error::AppError;
use crate::extractors::{extract_validated_json, ClientContext};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/institution-access/validate", post(validate_access))
        .route("/v1/dossiers/:id", get(get_dossier))
}

/// Successful access.
#[derive(Debug, Serialize, ToSchema)]
pub struct AccessResponse {
    #[schema(value_type = String, example = "granted")]
    pub outcome: AccessOutcome,
    pub message: String,
    pub validation_path: Option<ValidationPath>,
    /// Whether the attempt reached every audit sink.
    pub audit_recorded: bool,
    pub dossiers: Vec<Dossier>,
}

/// POST /v1/institution-access/validate — Validate an institution code.
#[utoipa::path(
    post,
    path = "/v1/institution-access/validate",
    request_body = AccessRequest,
    responses(
        (status = 200, description = "Access granted", body = AccessResponse),
        (status = 404, description = "Invalid code", body = crate::error::ErrorBody),
        (status = 410, description = "Expired code", body = crate::error::ErrorBody),
        (status = 403, description = "Profile mismatch or insufficient role", body = crate::error::ErrorBody),
        (status = 422, description = "Malformed request", body = crate::error::ErrorBody),
        (status = 429, description = "Too many attempts", body = crate::error::ErrorBody),
        (status = 500, description = "Technical error", body = crate::error::ErrorBody),
    ),
    tag = "institution-access"
)]
async fn validate_access(
    State(state): State<AppState>,
    caller: CallerIdentity,
    client: ClientContext,
    body: Result<Json<AccessRequest>, JsonRejection>,
) -> Result<Json<AccessResponse>, AppError> {
    require_role(&caller, Role::Institution)?;
    let req = extract_validated_json(body)?;

    let report = state.validator.validate(&req, &client).await;
    let grant = report.result.map_err(|failure| AppError::Access {
        failure,
        audit_recorded: report.audit_recorded,
    })?;

    let dossiers = state
        .dossiers
        .assemble(&grant, state.cipher.as_ref(), Utc::now());
    state
        .metrics
        .dossiers_active()
        .set(state.dossiers.active_count() as f64);

    Ok(Json(AccessResponse {
        outcome: AccessOutcome::Granted,
        message: messages::granted(dossiers.len()),
        validation_path: report.path,
        audit_recorded: report.audit_recorded,
        dossiers,
    }))
}

/// GET /v1/dossiers/:id — Fetch an assembled dossier until it expires.
#[utoipa::path(
    get,
    path = "/v1/dossiers/{id}",
    params(("id" = Uuid, Path, description = "Dossier ID")),
    responses(
        (status = 200, description = "Dossier", body = Dossier),
        (status = 404, description = "Unknown or expired dossier", body = crate::error::ErrorBody),
    ),
    tag = "institution-access"
)]
async fn get_dossier(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<Dossier>, AppError> {
    require_role(&caller, Role::Institution)?;
    let dossier = state.dossiers.get(&id, Utc::now());
    state
        .metrics
        .dossiers_active()
        .set(state.dossiers.active_count() as f64);
    dossier
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("dossier {id} not found or expired")))
}

//! # Directive & Institution Code Routes
//!
//! Patients finalize questionnaires into directives, list them, and
//! regenerate the institution code they hand to a healthcare professional.
//! When a dossier key is configured, directive content is stored as an
//! encrypted envelope and opened again on the way out.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use dplus_core::{Directive, DirectiveId, InstitutionCode, NewDirective, UserId};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{require_role, require_user_access, CallerIdentity, Role};
use crate::dossier::open_directive;
use crate::error::AppError;
use crate::extractors::{extract_validated_json, Validate};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/directives", post(create_directive).get(list_directives))
        .route("/v1/directives/:id/institution-code", post(regenerate_code))
}

/// Largest accepted directive content, serialized.
const MAX_CONTENT_BYTES: usize = 256 * 1024;

// -- Request / Response types -------------------------------------------------

/// Finalized questionnaire.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateDirectiveRequest {
    /// Owner. Patients may omit it; operators must set it.
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub user_id: Option<UserId>,
    /// Questionnaire answers and free text.
    #[schema(value_type = Object)]
    pub content: serde_json::Value,
}

impl Validate for CreateDirectiveRequest {
    fn validate(&self) -> Result<(), String> {
        if !self.content.is_object() {
            return Err("content must be a JSON object".into());
        }
        let size = self.content.to_string().len();
        if size > MAX_CONTENT_BYTES {
            return Err(format!(
                "content must be at most {MAX_CONTENT_BYTES} bytes, got {size}"
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct ListDirectivesQuery {
    /// Patient whose directives to list. Required for operators.
    #[serde(default)]
    pub user_id: Option<Uuid>,
}

/// A directive as returned to its owner.
#[derive(Debug, Serialize, ToSchema)]
pub struct DirectiveResponse {
    #[schema(value_type = String)]
    pub id: DirectiveId,
    #[schema(value_type = String)]
    pub user_id: UserId,
    /// Content could not be opened with the configured key.
    pub sealed: bool,
    #[schema(value_type = Option<Object>)]
    pub content: Option<serde_json::Value>,
    pub institution_code: Option<String>,
    pub institution_code_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// What the patient prints or shows to a healthcare professional.
#[derive(Debug, Serialize, ToSchema)]
pub struct AccessCard {
    #[schema(value_type = String)]
    pub directive_id: DirectiveId,
    #[schema(example = "9E5CUV7X")]
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub patient_name: String,
    pub birth_date: Option<String>,
}

fn directive_response(state: &AppState, directive: &Directive) -> DirectiveResponse {
    let opened = open_directive(directive, state.cipher.as_ref());
    DirectiveResponse {
        id: directive.id,
        user_id: directive.user_id,
        sealed: opened.sealed,
        content: opened.content,
        institution_code: directive.institution_code.clone(),
        institution_code_expires_at: directive.institution_code_expires_at,
        created_at: directive.created_at,
    }
}

/// Resolve whose data the caller is asking about.
fn target_user(caller: &CallerIdentity, requested: Option<UserId>) -> Result<UserId, AppError> {
    let user_id = requested.or(caller.user_id).ok_or_else(|| {
        AppError::Validation("user_id is required for operator requests".into())
    })?;
    require_user_access(caller, user_id)?;
    Ok(user_id)
}

// -- Handlers -----------------------------------------------------------------

/// POST /v1/directives — Finalize a questionnaire into a directive.
#[utoipa::path(
    post,
    path = "/v1/directives",
    request_body = CreateDirectiveRequest,
    responses(
        (status = 201, description = "Directive created", body = DirectiveResponse),
        (status = 403, description = "Not the owner", body = crate::error::ErrorBody),
        (status = 422, description = "Invalid content", body = crate::error::ErrorBody),
    ),
    tag = "directives"
)]
async fn create_directive(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<CreateDirectiveRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<DirectiveResponse>), AppError> {
    require_role(&caller, Role::Patient)?;
    let req = extract_validated_json(body)?;
    let user_id = target_user(&caller, req.user_id)?;

    let content = match &state.cipher {
        Some(cipher) => cipher.encrypt(&req.content)?,
        None => req.content,
    };
    let directive = state
        .directory
        .create_directive(&NewDirective { user_id, content })
        .await?;

    tracing::info!(directive_id = %directive.id, user_id = %user_id, "directive created");
    Ok((
        StatusCode::CREATED,
        Json(directive_response(&state, &directive)),
    ))
}

/// GET /v1/directives — List a patient's directives, newest first.
#[utoipa::path(
    get,
    path = "/v1/directives",
    params(
        ("user_id" = Option<Uuid>, Query, description = "Patient ID; required for operators")
    ),
    responses(
        (status = 200, description = "Directives", body = Vec<DirectiveResponse>),
        (status = 403, description = "Not the owner", body = crate::error::ErrorBody),
    ),
    tag = "directives"
)]
async fn list_directives(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Query(query): Query<ListDirectivesQuery>,
) -> Result<Json<Vec<DirectiveResponse>>, AppError> {
    require_role(&caller, Role::Patient)?;
    let user_id = target_user(&caller, query.user_id.map(UserId::from_uuid))?;

    let directives = state.directory.directives_for_user(user_id).await?;
    Ok(Json(
        directives
            .iter()
            .map(|d| directive_response(&state, d))
            .collect(),
    ))
}

/// POST /v1/directives/:id/institution-code — Issue a fresh institution code.
///
/// The previous code stops working immediately.
#[utoipa::path(
    post,
    path = "/v1/directives/{id}/institution-code",
    params(("id" = Uuid, Path, description = "Directive ID")),
    responses(
        (status = 200, description = "New access card", body = AccessCard),
        (status = 403, description = "Not the owner", body = crate::error::ErrorBody),
        (status = 404, description = "Directive not found", body = crate::error::ErrorBody),
    ),
    tag = "directives"
)]
async fn regenerate_code(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<AccessCard>, AppError> {
    require_role(&caller, Role::Patient)?;
    let directive_id = DirectiveId::from_uuid(id);
    let directive = state
        .directory
        .directive(directive_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("directive {id} not found")))?;
    require_user_access(&caller, directive.user_id)?;

    let code = InstitutionCode::generate();
    let expires_at = state.config.code_lifetime.expires_at(Utc::now());
    state
        .directory
        .set_institution_code(directive_id, &code, expires_at)
        .await?
        .ok_or_else(|| AppError::not_found(format!("directive {id} not found")))?;

    let profile = state.directory.profile(directive.user_id).await?;
    tracing::info!(
        directive_id = %directive_id,
        code = %code.masked(),
        %expires_at,
        "institution code issued"
    );

    Ok(Json(AccessCard {
        directive_id,
        code: code.as_str().to_string(),
        expires_at,
        patient_name: profile
            .as_ref()
            .map(|p| p.display_name())
            .unwrap_or_default(),
        birth_date: profile.and_then(|p| p.birth_date),
    }))
}

//! # Document Routes
//!
//! Generated directive PDFs and uploaded medical documents, listed newest
//! first and deleted by their owner.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get};
use axum::{Json, Router};
use dplus_core::{DocumentId, DocumentKind, MedicalDocument, UserId};
use uuid::Uuid;

use crate::access::documents::retrieve;
use crate::auth::{require_user_access, CallerIdentity};
use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/users/:id/documents", get(list_documents))
        .route("/v1/documents/:kind/:id", delete(delete_document))
}

/// GET /v1/users/:id/documents — All documents of a patient, newest first.
#[utoipa::path(
    get,
    path = "/v1/users/{id}/documents",
    params(("id" = Uuid, Path, description = "Patient ID")),
    responses(
        (status = 200, description = "Documents, newest first"),
        (status = 403, description = "Not the owner", body = crate::error::ErrorBody),
    ),
    tag = "documents"
)]
async fn list_documents(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<MedicalDocument>>, AppError> {
    let user_id = UserId::from_uuid(id);
    require_user_access(&caller, user_id)?;
    Ok(Json(retrieve(state.directory.as_ref(), user_id).await?))
}

/// DELETE /v1/documents/:kind/:id — Delete a document.
#[utoipa::path(
    delete,
    path = "/v1/documents/{kind}/{id}",
    params(
        ("kind" = String, Path, description = "`directive` or `medical`"),
        ("id" = Uuid, Path, description = "Document ID"),
    ),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not the owner", body = crate::error::ErrorBody),
        (status = 404, description = "Document not found", body = crate::error::ErrorBody),
        (status = 422, description = "Unknown document kind", body = crate::error::ErrorBody),
    ),
    tag = "documents"
)]
async fn delete_document(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path((kind, id)): Path<(String, Uuid)>,
) -> Result<StatusCode, AppError> {
    let kind: DocumentKind = kind.parse().map_err(AppError::Validation)?;
    let document_id = DocumentId::from_uuid(id);

    let document = state
        .directory
        .document(kind, document_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("{} document {id} not found", kind.as_str())))?;
    require_user_access(&caller, document.user_id)?;

    if !state.directory.delete_document(kind, document_id).await? {
        return Err(AppError::not_found(format!(
            "{} document {id} not found",
            kind.as_str()
        )));
    }
    tracing::info!(document_id = %document_id, kind = kind.as_str(), "document deleted");
    Ok(StatusCode::NO_CONTENT)
}

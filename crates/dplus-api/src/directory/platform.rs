//! Directory backed by the managed platform.

use chrono::{DateTime, Utc};
use dplus_core::{
    AccessLogEntry, Directive, DirectiveId, DocumentId, DocumentKind, InstitutionCode,
    MedicalDocument, NewDirective, Profile, UserId,
};
use dplus_platform_client::{PlatformClient, PlatformError, ValidateInstitutionAccessRequest};

use super::{AuthorityMatch, AuthorityRequest, Directory, DirectoryError};

/// [`Directory`] that delegates every call to a [`PlatformClient`].
#[derive(Debug, Clone)]
pub struct PlatformDirectory {
    client: PlatformClient,
}

impl PlatformDirectory {
    pub fn new(client: PlatformClient) -> Self {
        Self { client }
    }
}

fn failed(operation: &'static str) -> impl FnOnce(PlatformError) -> DirectoryError {
    move |source| DirectoryError::Platform { operation, source }
}

#[axum::async_trait]
impl Directory for PlatformDirectory {
    fn name(&self) -> &'static str {
        "platform"
    }

    async fn directives_by_code(
        &self,
        code: &InstitutionCode,
    ) -> Result<Vec<Directive>, DirectoryError> {
        self.client
            .directives()
            .find_by_institution_code(code)
            .await
            .map_err(failed("directives_by_code"))
    }

    async fn profile(&self, user_id: UserId) -> Result<Option<Profile>, DirectoryError> {
        self.client
            .profiles()
            .get(user_id)
            .await
            .map_err(failed("profile"))
    }

    async fn documents_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<MedicalDocument>, DirectoryError> {
        self.client
            .documents()
            .list_for_user(user_id)
            .await
            .map_err(failed("documents_for_user"))
    }

    async fn record_access(&self, entry: &AccessLogEntry) -> Result<(), DirectoryError> {
        self.client
            .access_logs()
            .insert(entry)
            .await
            .map_err(failed("record_access"))
    }

    async fn authority_validate(
        &self,
        request: &AuthorityRequest,
    ) -> Result<Vec<AuthorityMatch>, DirectoryError> {
        let rpc_request = ValidateInstitutionAccessRequest {
            institution_code: request.code.as_str().to_string(),
            patient_first_name: request.first_name.clone(),
            patient_last_name: request.last_name.clone(),
            patient_birth_date: request.birth_date.clone(),
        };
        let matches = self
            .client
            .rpc()
            .validate_institution_access(&rpc_request)
            .await
            .map_err(failed("authority_validate"))?;

        Ok(matches
            .into_iter()
            .map(|m| AuthorityMatch {
                user_id: m.user_id,
                directive_id: m.directive_id,
                expires_at: m.institution_code_expires_at,
            })
            .collect())
    }

    async fn directives_for_user(&self, user_id: UserId) -> Result<Vec<Directive>, DirectoryError> {
        self.client
            .directives()
            .list_for_user(user_id)
            .await
            .map_err(failed("directives_for_user"))
    }

    async fn directive(&self, id: DirectiveId) -> Result<Option<Directive>, DirectoryError> {
        self.client
            .directives()
            .get(id)
            .await
            .map_err(failed("directive"))
    }

    async fn create_directive(&self, new: &NewDirective) -> Result<Directive, DirectoryError> {
        self.client
            .directives()
            .create(new)
            .await
            .map_err(failed("create_directive"))
    }

    async fn set_institution_code(
        &self,
        id: DirectiveId,
        code: &InstitutionCode,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<Directive>, DirectoryError> {
        self.client
            .directives()
            .set_institution_code(id, code, expires_at)
            .await
            .map_err(failed("set_institution_code"))
    }

    async fn document(
        &self,
        kind: DocumentKind,
        id: DocumentId,
    ) -> Result<Option<MedicalDocument>, DirectoryError> {
        self.client
            .documents()
            .get(kind, id)
            .await
            .map_err(failed("document"))
    }

    async fn delete_document(
        &self,
        kind: DocumentKind,
        id: DocumentId,
    ) -> Result<bool, DirectoryError> {
        self.client
            .documents()
            .delete(kind, id)
            .await
            .map_err(failed("delete_document"))
    }
}

//! In-process directory for development and tests.
//!
//! Holds profiles, directives and documents in [`Store`]s. The authority
//! path evaluates submissions with the same matcher the fallback path
//! uses. Switches let tests exercise the fallback, the swallowed-audit
//! behavior, and an authority that ignores expiry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dplus_core::{
    AccessLogEntry, CodeLifetime, Directive, DirectiveId, DocumentId, DocumentKind,
    InstitutionCode, MedicalDocument, NewDirective, Profile, UserId,
};
use parking_lot::RwLock;

use super::{AuthorityMatch, AuthorityRequest, Directory, DirectoryError};
use crate::access::matcher::{profile_matches, SubmittedIdentity};
use crate::state::Store;

/// [`Directory`] kept in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryDirectory {
    profiles: Store<Profile>,
    directives: Store<Directive>,
    documents: Store<MedicalDocument>,
    access_logs: Arc<RwLock<Vec<AccessLogEntry>>>,
    fail_authority: Arc<AtomicBool>,
    fail_audit: Arc<AtomicBool>,
    fail_storage: Arc<AtomicBool>,
    stale_authority: Arc<AtomicBool>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_profile(&self, profile: Profile) {
        self.profiles.insert(*profile.id.as_uuid(), profile);
    }

    pub fn insert_directive(&self, directive: Directive) {
        self.directives.insert(*directive.id.as_uuid(), directive);
    }

    pub fn insert_document(&self, document: MedicalDocument) {
        self.documents.insert(*document.id.as_uuid(), document);
    }

    /// Access log rows recorded so far, in insertion order.
    pub fn access_logs(&self) -> Vec<AccessLogEntry> {
        self.access_logs.read().clone()
    }

    /// Make `authority_validate` fail.
    pub fn set_authority_failing(&self, failing: bool) {
        self.fail_authority.store(failing, Ordering::SeqCst);
    }

    /// Make `record_access` fail.
    pub fn set_audit_failing(&self, failing: bool) {
        self.fail_audit.store(failing, Ordering::SeqCst);
    }

    /// Make the authority report matches without checking their expiry.
    pub fn set_authority_stale(&self, stale: bool) {
        self.stale_authority.store(stale, Ordering::SeqCst);
    }

    /// Make every read fail.
    pub fn set_storage_failing(&self, failing: bool) {
        self.fail_storage.store(failing, Ordering::SeqCst);
    }

    fn check_storage(&self, operation: &'static str) -> Result<(), DirectoryError> {
        if self.fail_storage.load(Ordering::SeqCst) {
            return Err(DirectoryError::Unavailable {
                operation,
                message: "storage unavailable".into(),
            });
        }
        Ok(())
    }
}

#[axum::async_trait]
impl Directory for MemoryDirectory {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn directives_by_code(
        &self,
        code: &InstitutionCode,
    ) -> Result<Vec<Directive>, DirectoryError> {
        self.check_storage("directives_by_code")?;
        Ok(self.directives.filter(|d| {
            d.institution_code.as_deref() == Some(code.as_str())
                && d.institution_code_expires_at.is_some()
        }))
    }

    async fn profile(&self, user_id: UserId) -> Result<Option<Profile>, DirectoryError> {
        self.check_storage("profile")?;
        Ok(self.profiles.get(user_id.as_uuid()))
    }

    async fn documents_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<MedicalDocument>, DirectoryError> {
        self.check_storage("documents_for_user")?;
        let mut docs = self.documents.filter(|d| d.user_id == user_id);
        docs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(docs)
    }

    async fn record_access(&self, entry: &AccessLogEntry) -> Result<(), DirectoryError> {
        if self.fail_audit.load(Ordering::SeqCst) {
            return Err(DirectoryError::Unavailable {
                operation: "record_access",
                message: "audit table unavailable".into(),
            });
        }
        self.access_logs.write().push(entry.clone());
        Ok(())
    }

    async fn authority_validate(
        &self,
        request: &AuthorityRequest,
    ) -> Result<Vec<AuthorityMatch>, DirectoryError> {
        if self.fail_authority.load(Ordering::SeqCst) {
            return Err(DirectoryError::Unavailable {
                operation: "authority_validate",
                message: "validation function unavailable".into(),
            });
        }
        self.check_storage("authority_validate")?;

        let Ok(identity) = SubmittedIdentity::new(
            &request.first_name,
            &request.last_name,
            request.birth_date.as_deref(),
        ) else {
            return Ok(Vec::new());
        };

        let now = Utc::now();
        let check_expiry = !self.stale_authority.load(Ordering::SeqCst);
        let mut matches = Vec::new();
        for directive in self.directives_by_code(&request.code).await? {
            let Some(expires_at) = directive.institution_code_expires_at else {
                continue;
            };
            if check_expiry && CodeLifetime::is_expired(expires_at, now) {
                continue;
            }
            let matched = self
                .profiles
                .get(directive.user_id.as_uuid())
                .is_some_and(|p| profile_matches(&identity, &p));
            if matched {
                matches.push(AuthorityMatch {
                    user_id: directive.user_id,
                    directive_id: Some(directive.id),
                    expires_at: Some(expires_at),
                });
            }
        }
        Ok(matches)
    }

    async fn directives_for_user(&self, user_id: UserId) -> Result<Vec<Directive>, DirectoryError> {
        self.check_storage("directives_for_user")?;
        let mut directives = self.directives.filter(|d| d.user_id == user_id);
        directives.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(directives)
    }

    async fn directive(&self, id: DirectiveId) -> Result<Option<Directive>, DirectoryError> {
        self.check_storage("directive")?;
        Ok(self.directives.get(id.as_uuid()))
    }

    async fn create_directive(&self, new: &NewDirective) -> Result<Directive, DirectoryError> {
        self.check_storage("create_directive")?;
        let directive = Directive {
            id: DirectiveId::new(),
            user_id: new.user_id,
            content: new.content.clone(),
            institution_code: None,
            institution_code_expires_at: None,
            created_at: Utc::now(),
            updated_at: None,
        };
        self.insert_directive(directive.clone());
        Ok(directive)
    }

    async fn set_institution_code(
        &self,
        id: DirectiveId,
        code: &InstitutionCode,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<Directive>, DirectoryError> {
        self.check_storage("set_institution_code")?;
        Ok(self.directives.update(id.as_uuid(), |d| {
            d.institution_code = Some(code.as_str().to_string());
            d.institution_code_expires_at = Some(expires_at);
            d.updated_at = Some(Utc::now());
        }))
    }

    async fn document(
        &self,
        kind: DocumentKind,
        id: DocumentId,
    ) -> Result<Option<MedicalDocument>, DirectoryError> {
        self.check_storage("document")?;
        Ok(self.documents.get(id.as_uuid()).filter(|d| d.kind == kind))
    }

    async fn delete_document(
        &self,
        kind: DocumentKind,
        id: DocumentId,
    ) -> Result<bool, DirectoryError> {
        self.check_storage("delete_document")?;
        if self.document(kind, id).await?.is_none() {
            return Ok(false);
        }
        Ok(self.documents.remove(id.as_uuid()).is_some())
    }
}

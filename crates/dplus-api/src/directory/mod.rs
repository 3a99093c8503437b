//! # Directory
//!
//! The seam between the access flow and storage. A [`Directory`] exposes the
//! reads and writes the institution access flow needs (code lookup, profile
//! fetch, document listing, audit insert, the server-side authority) plus
//! the directive and document management operations.
//!
//! - [`PlatformDirectory`] delegates to the managed backend.
//! - [`MemoryDirectory`] keeps everything in process, for development and
//!   tests, and can be told to fail the authority or audit writes.

pub mod memory;
pub mod platform;

pub use memory::MemoryDirectory;
pub use platform::PlatformDirectory;

use chrono::{DateTime, Utc};
use dplus_core::{
    AccessLogEntry, Directive, DirectiveId, DocumentId, DocumentKind, InstitutionCode,
    MedicalDocument, NewDirective, Profile, UserId,
};
use dplus_platform_client::PlatformError;
use thiserror::Error;

/// Submission forwarded to the server-side authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorityRequest {
    pub code: InstitutionCode,
    /// As submitted; the authority normalizes.
    pub first_name: String,
    pub last_name: String,
    pub birth_date: Option<String>,
}

/// One patient the authority matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorityMatch {
    pub user_id: UserId,
    pub directive_id: Option<DirectiveId>,
    /// Expiry of the matched code, when the authority reports it.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Storage failure. Carries the operation for logs.
#[derive(Error, Debug)]
pub enum DirectoryError {
    /// The managed backend call failed.
    #[error("{operation}: {source}")]
    Platform {
        operation: &'static str,
        #[source]
        source: PlatformError,
    },

    /// The backing store refused the operation.
    #[error("{operation}: {message}")]
    Unavailable {
        operation: &'static str,
        message: String,
    },
}

impl DirectoryError {
    /// The operation that failed.
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Platform { operation, .. } | Self::Unavailable { operation, .. } => operation,
        }
    }
}

/// Storage operations used by the API.
#[axum::async_trait]
pub trait Directory: Send + Sync + std::fmt::Debug {
    /// Short name for logs (`platform`, `memory`).
    fn name(&self) -> &'static str;

    /// Directives carrying `code` with a non-null expiry, expired ones included.
    async fn directives_by_code(
        &self,
        code: &InstitutionCode,
    ) -> Result<Vec<Directive>, DirectoryError>;

    async fn profile(&self, user_id: UserId) -> Result<Option<Profile>, DirectoryError>;

    /// All PDF and medical documents of a patient.
    async fn documents_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<MedicalDocument>, DirectoryError>;

    /// Append an access log row.
    async fn record_access(&self, entry: &AccessLogEntry) -> Result<(), DirectoryError>;

    /// Ask the server-side authority which patients the submission matches.
    async fn authority_validate(
        &self,
        request: &AuthorityRequest,
    ) -> Result<Vec<AuthorityMatch>, DirectoryError>;

    /// Directives of a patient, newest first.
    async fn directives_for_user(&self, user_id: UserId) -> Result<Vec<Directive>, DirectoryError>;

    async fn directive(&self, id: DirectiveId) -> Result<Option<Directive>, DirectoryError>;

    async fn create_directive(&self, new: &NewDirective) -> Result<Directive, DirectoryError>;

    /// Replace a directive's code. `Ok(None)` when the directive does not exist.
    async fn set_institution_code(
        &self,
        id: DirectiveId,
        code: &InstitutionCode,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<Directive>, DirectoryError>;

    async fn document(
        &self,
        kind: DocumentKind,
        id: DocumentId,
    ) -> Result<Option<MedicalDocument>, DirectoryError>;

    /// Delete a document. Returns whether it existed.
    async fn delete_document(&self, kind: DocumentKind, id: DocumentId)
        -> Result<bool, DirectoryError>;
}

//! # Institution Access Validation
//!
//! A healthcare professional submits a patient's institution code together
//! with the patient's name and, optionally, birth date. The flow:
//!
//! 1. **Throttle**: sliding-window limit per code and per client address.
//! 2. **Code lookup** ([`lookup`]): malformed, unknown, expired or valid.
//! 3. **Profile matching** ([`matcher`]): trimmed, case-insensitive names;
//!    exact ISO birth date when one is submitted.
//! 4. **Validation path** ([`validator`]): the server-side authority first,
//!    the table-by-table fallback when it fails (configurable).
//! 5. **Document retrieval** ([`documents`]): newest first, per matched patient.
//! 6. **Audit** ([`audit`]): one row per attempt; failures are counted and
//!    reported, never fatal.
//!
//! User-facing wording lives in [`messages`].

pub mod audit;
pub mod documents;
pub mod lookup;
pub mod matcher;
pub mod messages;
pub mod validator;

pub use validator::AccessValidator;

use dplus_core::{
    normalize_birth_date, AccessOutcome, Directive, DocumentId, InstitutionCode, MedicalDocument,
    Profile, UserId,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::extractors::{require_text, Validate, MAX_FIELD_LEN};

/// Which validation paths run, and in what order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStrategy {
    /// Authority first, fallback when the authority errors.
    #[default]
    Hybrid,
    /// Authority only; an authority error is a technical error.
    AuthorityOnly,
    /// Table lookups and the in-process matcher only.
    FallbackOnly,
}

impl ValidationStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hybrid => "hybrid",
            Self::AuthorityOnly => "authority_only",
            Self::FallbackOnly => "fallback_only",
        }
    }
}

impl std::str::FromStr for ValidationStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hybrid" => Ok(Self::Hybrid),
            "authority_only" => Ok(Self::AuthorityOnly),
            "fallback_only" => Ok(Self::FallbackOnly),
            other => Err(format!(
                "unknown validation strategy '{other}' (expected hybrid, authority_only or fallback_only)"
            )),
        }
    }
}

/// Which path produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ValidationPath {
    Authority,
    Fallback,
}

impl ValidationPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authority => "authority",
            Self::Fallback => "fallback",
        }
    }
}

/// Why access was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessFailure {
    #[error("institution code not found")]
    InvalidCode,

    #[error("institution code expired")]
    ExpiredCode,

    #[error("submitted identity does not match the patient profile")]
    ProfileMismatch,

    #[error("too many attempts, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Storage or network failure. The message is for logs only.
    #[error("technical error: {0}")]
    Technical(String),
}

impl AccessFailure {
    /// Audit outcome for this failure.
    pub fn outcome(&self) -> AccessOutcome {
        match self {
            Self::InvalidCode => AccessOutcome::InvalidCode,
            Self::ExpiredCode => AccessOutcome::ExpiredCode,
            Self::ProfileMismatch => AccessOutcome::ProfileMismatch,
            Self::RateLimited { .. } => AccessOutcome::RateLimited,
            Self::Technical(_) => AccessOutcome::TechnicalError,
        }
    }
}

/// Submission from a healthcare professional.
///
/// camelCase aliases are accepted for the field names the web client sends.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AccessRequest {
    /// Institution code as given by the patient (case and surrounding spaces ignored).
    pub code: String,
    #[serde(alias = "firstName")]
    pub first_name: String,
    #[serde(alias = "lastName")]
    pub last_name: String,
    /// `YYYY-MM-DD`. When absent, birth date is not compared.
    #[serde(default, alias = "birthDate")]
    pub birth_date: Option<String>,
    /// Name of the professional making the request.
    #[serde(default, alias = "accessorName")]
    pub accessor_name: Option<String>,
    /// Institution of the professional.
    #[serde(default, alias = "accessorInstitution")]
    pub accessor_institution: Option<String>,
}

impl Validate for AccessRequest {
    fn validate(&self) -> Result<(), String> {
        require_text("code", &self.code)?;
        require_text("first_name", &self.first_name)?;
        require_text("last_name", &self.last_name)?;
        if let Some(birth_date) = self.birth_date.as_deref().filter(|b| !b.trim().is_empty()) {
            normalize_birth_date(birth_date).map_err(|e| e.to_string())?;
        }
        for (field, value) in [
            ("accessor_name", &self.accessor_name),
            ("accessor_institution", &self.accessor_institution),
        ] {
            if value.as_ref().is_some_and(|v| v.len() > MAX_FIELD_LEN) {
                return Err(format!("{field} must be at most {MAX_FIELD_LEN} bytes"));
            }
        }
        Ok(())
    }
}

/// One patient released by a grant.
#[derive(Debug, Clone, PartialEq)]
pub struct GrantedPatient {
    pub profile: Profile,
    /// Directives of this patient carrying the validated code.
    pub directives: Vec<Directive>,
    /// All documents of the patient, newest first.
    pub documents: Vec<MedicalDocument>,
}

/// Successful validation.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessGrant {
    pub code: InstitutionCode,
    pub patients: Vec<GrantedPatient>,
}

impl AccessGrant {
    pub fn user_ids(&self) -> Vec<UserId> {
        self.patients.iter().map(|p| p.profile.id).collect()
    }

    pub fn document_ids(&self) -> Vec<DocumentId> {
        self.patients
            .iter()
            .flat_map(|p| p.documents.iter().map(|d| d.id))
            .collect()
    }
}

/// Everything the caller learns about one attempt.
#[derive(Debug, Clone)]
pub struct AccessReport {
    pub result: Result<AccessGrant, AccessFailure>,
    /// `None` when the attempt stopped before any lookup.
    pub path: Option<ValidationPath>,
    /// Whether every audit sink accepted the row.
    pub audit_recorded: bool,
}

impl AccessReport {
    pub fn outcome(&self) -> AccessOutcome {
        match &self.result {
            Ok(_) => AccessOutcome::Granted,
            Err(failure) => failure.outcome(),
        }
    }
}

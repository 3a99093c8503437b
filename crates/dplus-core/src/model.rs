//! # Data Model
//!
//! Records persisted by the managed backend. This codebase does not own
//! their storage; the types mirror the platform's column names so rows
//! deserialize directly.
//!
//! | Record | Lifecycle |
//! |--------|-----------|
//! | [`Profile`] | Created at signup, edited by the patient, never deleted here. |
//! | [`Directive`] | Created when a questionnaire is finalized; its institution code is regenerated on demand. |
//! | [`MedicalDocument`] | Created on upload or PDF generation; deleted on explicit request. |
//! | [`AccessLogEntry`] | Append-only; one row per access attempt. |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::{AccessLogId, DirectiveId, DocumentId, UserId};

/// Patient profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Same id as the owning account.
    pub id: UserId,
    /// Given name as entered by the patient.
    #[serde(default)]
    pub first_name: Option<String>,
    /// Family name as entered by the patient.
    #[serde(default)]
    pub last_name: Option<String>,
    /// ISO 8601 date (`YYYY-MM-DD`), possibly stored as a date-time.
    #[serde(default)]
    pub birth_date: Option<String>,
    /// Contact email.
    #[serde(default)]
    pub email: Option<String>,
    /// Contact phone number.
    #[serde(default, rename = "phone_number")]
    pub phone: Option<String>,
    /// Postal address.
    #[serde(default)]
    pub address: Option<String>,
}

impl Profile {
    /// "First Last", skipping missing parts.
    pub fn display_name(&self) -> String {
        [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A finalized advance directive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Directive {
    /// Directive id.
    pub id: DirectiveId,
    /// Owning patient.
    pub user_id: UserId,
    /// Questionnaire answers and free text, or an encrypted envelope.
    pub content: serde_json::Value,
    /// Current institution code, if one was generated.
    #[serde(default)]
    pub institution_code: Option<String>,
    /// Expiry of the current institution code.
    #[serde(default)]
    pub institution_code_expires_at: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Insert payload for a new directive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDirective {
    /// Owning patient.
    pub user_id: UserId,
    /// Questionnaire content (plain or encrypted envelope).
    pub content: serde_json::Value,
}

/// Which table a document lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// PDF generated from a directive (`pdf_documents`).
    Directive,
    /// Medical document uploaded by the patient (`medical_documents`).
    #[default]
    Medical,
}

impl DocumentKind {
    /// Platform table holding documents of this kind.
    pub fn table(&self) -> &'static str {
        match self {
            Self::Directive => "pdf_documents",
            Self::Medical => "medical_documents",
        }
    }

    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Directive => "directive",
            Self::Medical => "medical",
        }
    }
}

impl std::str::FromStr for DocumentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "directive" => Ok(Self::Directive),
            "medical" => Ok(Self::Medical),
            other => Err(format!("unknown document kind: {other}")),
        }
    }
}

/// Stored PDF or medical document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicalDocument {
    /// Document id.
    pub id: DocumentId,
    /// Owning patient.
    pub user_id: UserId,
    /// Original file name.
    pub file_name: String,
    /// Storage URL or data URI.
    pub file_path: String,
    /// MIME type.
    #[serde(default)]
    pub content_type: Option<String>,
    /// Source table; not a column, filled in by the reader.
    #[serde(default, skip_deserializing)]
    pub kind: DocumentKind,
    /// Upload or generation time.
    pub created_at: DateTime<Utc>,
}

/// Result of one institution access attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessOutcome {
    /// Code valid, profile matched, documents returned.
    Granted,
    /// No directive carries the submitted code.
    InvalidCode,
    /// The code exists but every match is past its expiry.
    ExpiredCode,
    /// The code is valid but the submitted identity does not match.
    ProfileMismatch,
    /// Too many attempts for this code or client.
    RateLimited,
    /// Storage or network failure.
    TechnicalError,
}

impl AccessOutcome {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Granted => "granted",
            Self::InvalidCode => "invalid_code",
            Self::ExpiredCode => "expired_code",
            Self::ProfileMismatch => "profile_mismatch",
            Self::RateLimited => "rate_limited",
            Self::TechnicalError => "technical_error",
        }
    }

    /// Whether access was granted.
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted)
    }
}

impl std::fmt::Display for AccessOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only audit row for an institution access attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessLogEntry {
    /// Row id.
    pub id: AccessLogId,
    /// Patient whose data was accessed, when known.
    #[serde(default)]
    pub user_id: Option<UserId>,
    /// Masked code as submitted.
    pub code_used: String,
    /// Name of the professional who made the request.
    #[serde(default)]
    pub accessor_name: Option<String>,
    /// Institution of the professional.
    #[serde(default)]
    pub accessor_institution: Option<String>,
    /// Decision.
    pub outcome: AccessOutcome,
    /// Client address, when known.
    #[serde(default)]
    pub ip_address: Option<String>,
    /// Client user agent, when known.
    #[serde(default)]
    pub user_agent: Option<String>,
    /// When the attempt was made.
    pub accessed_at: DateTime<Utc>,
    /// Extra context (accessed document ids, validation path).
    #[serde(default)]
    pub details: serde_json::Value,
}

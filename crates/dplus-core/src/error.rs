//! # Error Hierarchy
//!
//! Validation errors for domain primitives, built with `thiserror`.
//! Each variant carries the rejected input so that operators can tell what
//! was submitted without reaching for a debugger.

use thiserror::Error;

/// Validation errors for domain primitive newtypes and submitted fields.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Institution code is not eight ASCII alphanumeric characters.
    /// Carries only the length of the trimmed input.
    #[error("invalid institution code: {length} characters submitted (expected 8 letters or digits)")]
    InvalidInstitutionCode {
        /// Length of the trimmed input.
        length: usize,
    },

    /// A required name field is empty after trimming.
    #[error("{field} must not be empty")]
    EmptyName {
        /// Which field was empty (`first_name`, `last_name`).
        field: &'static str,
    },

    /// Birth date is not an ISO 8601 calendar date.
    #[error("invalid birth date: \"{value}\" ({reason})")]
    InvalidBirthDate {
        /// The string that failed to parse.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Email address fails basic shape validation.
    #[error("invalid email address: \"{0}\"")]
    InvalidEmail(String),
}

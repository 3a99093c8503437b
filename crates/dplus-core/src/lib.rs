#![deny(missing_docs)]

//! # dplus-core — Foundational Types for DirectivesPlus
//!
//! This crate defines the types every other crate in the workspace shares:
//! the patient data model, identifier newtypes, the institution code, and the
//! normalization rules used when a healthcare professional's submission is
//! compared with a stored profile. It performs no I/O.
//!
//! ## Design Principles
//!
//! 1. **Newtype wrappers for identifiers.** A [`UserId`] cannot be passed where
//!    a [`DirectiveId`] is expected.
//!
//! 2. **[`InstitutionCode`] is validated at construction.** Once a value of the
//!    type exists it is trimmed, upper-cased, and exactly eight alphanumerics.
//!
//! 3. **One normalization path.** [`normalize_name`] and [`normalize_birth_date`]
//!    are the only way submitted personal fields are prepared for comparison.
//!
//! 4. **[`ValidationError`] hierarchy.** Structured errors with `thiserror`, no
//!    `.unwrap()` outside tests.

pub mod code;
pub mod error;
pub mod identity;
pub mod lifetime;
pub mod model;
pub mod normalize;

pub use code::InstitutionCode;
pub use error::ValidationError;
pub use identity::{AccessLogId, DirectiveId, DocumentId, UserId};
pub use lifetime::CodeLifetime;
pub use model::{
    AccessLogEntry, AccessOutcome, Directive, DocumentKind, MedicalDocument, NewDirective, Profile,
};
pub use normalize::{normalize_birth_date, normalize_name, validate_email};

//! # API Route Modules
//!
//! - `access`: institution code validation and dossier retrieval, for
//!   healthcare professionals.
//! - `directives`: directive creation, listing, and institution code
//!   regeneration, for patients.
//! - `documents`: PDF and medical document listing and deletion.
//! - `auth`: relay to the platform's password, OTP and refresh endpoints.
//!   Mounted outside the authentication middleware.

pub mod access;
pub mod auth;
pub mod directives;
pub mod documents;

//! Profile matching.
//!
//! The one comparison used by the fallback path and by the in-memory
//! authority. Names are trimmed and lowercased on both sides, nothing more:
//! accents, hyphens and inner spaces must match exactly. Birth dates are
//! compared as `YYYY-MM-DD` strings, and only when one was submitted.

use dplus_core::{
    normalize_birth_date, normalize_name, Directive, Profile, UserId, ValidationError,
};

use super::AccessRequest;
use crate::directory::{Directory, DirectoryError};

/// Normalized personal fields from a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedIdentity {
    first_name: String,
    last_name: String,
    birth_date: Option<String>,
}

impl SubmittedIdentity {
    /// Normalize submitted fields. An empty birth date counts as absent.
    pub fn new(
        first_name: &str,
        last_name: &str,
        birth_date: Option<&str>,
    ) -> Result<Self, ValidationError> {
        let first_name = normalize_name(first_name);
        if first_name.is_empty() {
            return Err(ValidationError::EmptyName { field: "first_name" });
        }
        let last_name = normalize_name(last_name);
        if last_name.is_empty() {
            return Err(ValidationError::EmptyName { field: "last_name" });
        }
        let birth_date = birth_date
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .map(normalize_birth_date)
            .transpose()?;

        Ok(Self {
            first_name,
            last_name,
            birth_date,
        })
    }

    pub fn from_request(request: &AccessRequest) -> Result<Self, ValidationError> {
        Self::new(
            &request.first_name,
            &request.last_name,
            request.birth_date.as_deref(),
        )
    }

    pub fn birth_date(&self) -> Option<&str> {
        self.birth_date.as_deref()
    }
}

/// Whether `profile` matches the submission.
///
/// A profile without a birth date matches only submissions without one.
/// A stored birth date that does not parse never matches a submitted one.
pub fn profile_matches(identity: &SubmittedIdentity, profile: &Profile) -> bool {
    let same_name = |stored: Option<&str>, submitted: &str| {
        stored.is_some_and(|s| normalize_name(s) == submitted)
    };

    if !same_name(profile.first_name.as_deref(), &identity.first_name)
        || !same_name(profile.last_name.as_deref(), &identity.last_name)
    {
        return false;
    }

    match &identity.birth_date {
        None => true,
        Some(submitted) => profile
            .birth_date
            .as_deref()
            .and_then(|stored| normalize_birth_date(stored).ok())
            .is_some_and(|stored| &stored == submitted),
    }
}

/// Fetch the owners of `directives` and keep those matching the submission.
///
/// Returns each matching profile with its directives, in order of first
/// appearance. Owners without a profile row are skipped.
pub async fn match_candidates(
    directory: &dyn Directory,
    identity: &SubmittedIdentity,
    directives: &[Directive],
) -> Result<Vec<(Profile, Vec<Directive>)>, DirectoryError> {
    let mut owners: Vec<UserId> = Vec::new();
    for directive in directives {
        if !owners.contains(&directive.user_id) {
            owners.push(directive.user_id);
        }
    }

    let mut matched = Vec::new();
    for owner in owners {
        let Some(profile) = directory.profile(owner).await? else {
            tracing::debug!(user_id = %owner, "directive owner has no profile row");
            continue;
        };
        if profile_matches(identity, &profile) {
            let own: Vec<Directive> = directives
                .iter()
                .filter(|d| d.user_id == owner)
                .cloned()
                .collect();
            matched.push((profile, own));
        }
    }
    Ok(matched)
}

//! Institution code lookup.
//!
//! Rows carrying the code are split into valid and expired by their expiry
//! timestamp. A code is expired only when every row carrying it is.

use chrono::{DateTime, Utc};
use dplus_core::{CodeLifetime, Directive, InstitutionCode, UserId};

use super::AccessFailure;
use crate::directory::{Directory, DirectoryError};

/// Classification of a code at a given instant.
#[derive(Debug, Clone, PartialEq)]
pub enum CodeLookup {
    /// Unexpired directives carrying the code.
    Valid(Vec<Directive>),
    /// The code exists but every row is past expiry.
    Expired,
    /// No row carries the code.
    NotFound,
}

impl CodeLookup {
    /// Failure to report when the lookup alone decides the attempt.
    pub fn failure(&self) -> Option<AccessFailure> {
        match self {
            Self::Valid(_) => None,
            Self::Expired => Some(AccessFailure::ExpiredCode),
            Self::NotFound => Some(AccessFailure::InvalidCode),
        }
    }

    /// Owner of the valid directives, when there is exactly one.
    pub fn sole_owner(&self) -> Option<UserId> {
        let Self::Valid(directives) = self else {
            return None;
        };
        let first = directives.first()?.user_id;
        directives
            .iter()
            .all(|d| d.user_id == first)
            .then_some(first)
    }
}

/// Split rows into valid / expired. Rows without an expiry are ignored.
pub fn classify(rows: Vec<Directive>, now: DateTime<Utc>) -> CodeLookup {
    let mut seen = false;
    let valid: Vec<Directive> = rows
        .into_iter()
        .filter(|d| {
            let Some(expires_at) = d.institution_code_expires_at else {
                return false;
            };
            seen = true;
            !CodeLifetime::is_expired(expires_at, now)
        })
        .collect();

    if !valid.is_empty() {
        CodeLookup::Valid(valid)
    } else if seen {
        CodeLookup::Expired
    } else {
        CodeLookup::NotFound
    }
}

/// Fetch and classify the rows carrying `code`.
pub async fn lookup_code(
    directory: &dyn Directory,
    code: &InstitutionCode,
    now: DateTime<Utc>,
) -> Result<CodeLookup, DirectoryError> {
    let rows = directory
        .directives_by_code(code)
        .await?
        .into_iter()
        .filter(|d| {
            d.institution_code
                .as_deref()
                .is_some_and(|c| c.eq_ignore_ascii_case(code.as_str()))
        })
        .collect();
    Ok(classify(rows, now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use dplus_core::DirectiveId;

    fn row(user_id: UserId, expires_at: Option<DateTime<Utc>>) -> Directive {
        Directive {
            id: DirectiveId::new(),
            user_id,
            content: serde_json::json!({}),
            institution_code: Some("9E5CUV7X".into()),
            institution_code_expires_at: expires_at,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn no_rows_is_not_found() {
        assert_eq!(classify(vec![], Utc::now()), CodeLookup::NotFound);
        assert_eq!(
            classify(vec![], Utc::now()).failure(),
            Some(AccessFailure::InvalidCode)
        );
    }

    #[test]
    fn rows_without_expiry_are_ignored() {
        let now = Utc::now();
        assert_eq!(classify(vec![row(UserId::new(), None)], now), CodeLookup::NotFound);
    }

    #[test]
    fn all_past_expiry_is_expired() {
        let now = Utc::now();
        let user = UserId::new();
        let rows = vec![
            row(user, Some(now - Duration::days(1))),
            row(user, Some(now - Duration::days(40))),
        ];
        let lookup = classify(rows, now);
        assert_eq!(lookup, CodeLookup::Expired);
        assert_eq!(lookup.failure(), Some(AccessFailure::ExpiredCode));
    }

    #[test]
    fn expiry_equal_to_now_is_expired() {
        let now = Utc::now();
        assert_eq!(
            classify(vec![row(UserId::new(), Some(now))], now),
            CodeLookup::Expired
        );
    }

    #[test]
    fn expired_rows_are_filtered_from_valid() {
        let now = Utc::now();
        let user = UserId::new();
        let live = row(user, Some(now + Duration::days(3)));
        let rows = vec![row(user, Some(now - Duration::days(1))), live.clone()];
        match classify(rows, now) {
            CodeLookup::Valid(valid) => assert_eq!(valid, vec![live]),
            other => panic!("expected Valid, got {other:?}"),
        }
    }

    #[test]
    fn sole_owner() {
        let now = Utc::now();
        let a = UserId::new();
        let b = UserId::new();
        let one = classify(vec![row(a, Some(now + Duration::days(1)))], now);
        assert_eq!(one.sole_owner(), Some(a));

        let two = classify(
            vec![
                row(a, Some(now + Duration::days(1))),
                row(b, Some(now + Duration::days(1))),
            ],
            now,
        );
        assert_eq!(two.sole_owner(), None);
        assert_eq!(CodeLookup::Expired.sole_owner(), None);
    }
}

//! # Submitted-Field Normalization
//!
//! Name fields are compared after trimming and lowercasing, nothing more:
//! accents, inner spacing, and hyphens are significant. Birth dates are
//! reduced to their `YYYY-MM-DD` calendar part and compared as strings.

use chrono::NaiveDate;

use crate::error::ValidationError;

/// Trim and lowercase a name for comparison.
pub fn normalize_name(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Reduce an ISO 8601 date or date-time to its calendar date.
///
/// Accepts `1963-08-13` as well as `1963-08-13T00:00:00Z` and returns
/// `1963-08-13` for both.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidBirthDate`] when the leading ten
/// characters are not a valid calendar date.
pub fn normalize_birth_date(value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    let date_part = trimmed.get(..10).unwrap_or(trimmed);
    if let Some(rest) = trimmed.get(10..) {
        if !rest.is_empty() && !rest.starts_with(['T', ' ']) {
            return Err(ValidationError::InvalidBirthDate {
                value: value.to_string(),
                reason: "unexpected characters after date".to_string(),
            });
        }
    }
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .map(|d| d.format("%Y-%m-%d").to_string())
        .map_err(|e| ValidationError::InvalidBirthDate {
            value: value.to_string(),
            reason: format!("expected YYYY-MM-DD: {e}"),
        })
}

/// Basic email shape check: one `@`, non-empty local part, dotted domain.
pub fn validate_email(value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    let valid = match trimmed.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !trimmed.contains(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(trimmed.to_lowercase())
    } else {
        Err(ValidationError::InvalidEmail(value.to_string()))
    }
}

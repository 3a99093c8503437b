//! # Code Lifetime
//!
//! Institution codes expire a fixed number of days after they are issued.
//! Timestamps are UTC throughout; a code whose expiry equals the current
//! instant is already expired.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Validity window applied when an institution code is (re)generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeLifetime {
    days: u32,
}

impl CodeLifetime {
    /// Default validity window in days.
    pub const DEFAULT_DAYS: u32 = 30;

    /// Create a lifetime of `days` days. Zero is clamped to one day.
    pub fn days(days: u32) -> Self {
        Self { days: days.max(1) }
    }

    /// Number of days a code stays valid.
    pub fn as_days(&self) -> u32 {
        self.days
    }

    /// Expiry instant for a code issued at `issued_at`.
    pub fn expires_at(&self, issued_at: DateTime<Utc>) -> DateTime<Utc> {
        issued_at + Duration::days(i64::from(self.days))
    }

    /// Whether a code with the given expiry is expired at `now`.
    pub fn is_expired(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        expires_at <= now
    }
}

impl Default for CodeLifetime {
    fn default() -> Self {
        Self::days(Self::DEFAULT_DAYS)
    }
}

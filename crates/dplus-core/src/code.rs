//! # Institution Codes
//!
//! An institution code is the time-limited shared secret a patient hands to a
//! healthcare professional. It is eight characters from `A-Z0-9`, compared
//! after trimming and upper-casing so that `" 9e5cuv7x "` and `"9E5CUV7X"`
//! address the same directive.

use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Number of characters in an institution code.
pub const CODE_LENGTH: usize = 8;

const ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Largest multiple of the alphabet size that fits in a byte. Bytes at or
/// above it are rejected so every character is equally likely.
const REJECTION_THRESHOLD: u8 = (256 / ALPHABET.len() * ALPHABET.len()) as u8;

/// A validated institution access code.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InstitutionCode(String);

impl InstitutionCode {
    /// Parse a submitted code.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidInstitutionCode`] unless the trimmed,
    /// upper-cased input is exactly eight ASCII letters or digits.
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        let normalized = value.trim().to_ascii_uppercase();
        if normalized.len() != CODE_LENGTH
            || !normalized.bytes().all(|b| b.is_ascii_alphanumeric())
        {
            return Err(ValidationError::InvalidInstitutionCode {
                length: normalized.chars().count(),
            });
        }
        Ok(Self(normalized))
    }

    /// Generate a fresh code from the operating system CSPRNG.
    pub fn generate() -> Self {
        let mut out = String::with_capacity(CODE_LENGTH);
        let mut buf = [0u8; 16];
        while out.len() < CODE_LENGTH {
            OsRng.fill_bytes(&mut buf);
            for b in buf {
                if b >= REJECTION_THRESHOLD {
                    continue;
                }
                out.push(ALPHABET[(b as usize) % ALPHABET.len()] as char);
                if out.len() == CODE_LENGTH {
                    break;
                }
            }
        }
        Self(out)
    }

    /// Access the normalized code.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Render the code with its last four characters hidden, for logs.
    pub fn masked(&self) -> String {
        format!("{}****", &self.0[..4])
    }
}

impl std::fmt::Display for InstitutionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// Debug never prints the full secret.
impl std::fmt::Debug for InstitutionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("InstitutionCode").field(&self.masked()).finish()
    }
}

impl TryFrom<String> for InstitutionCode {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<InstitutionCode> for String {
    fn from(code: InstitutionCode) -> Self {
        code.0
    }
}

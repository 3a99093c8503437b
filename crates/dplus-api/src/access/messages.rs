//! User-facing messages, in French.
//!
//! Every response the institution-facing client displays comes from here.
//! Technical detail never does.

use super::AccessFailure;

pub const GRANTED: &str = "Accès autorisé au dossier du patient.";

pub const INVALID_CODE: &str =
    "Code d'accès invalide. Vérifiez le code communiqué par le patient.";

pub const EXPIRED_CODE: &str =
    "Ce code d'accès a expiré. Le patient doit générer un nouveau code depuis son espace.";

pub const PROFILE_MISMATCH: &str =
    "Aucune correspondance exacte entre les informations saisies et le profil associé à ce code.";

pub const TECHNICAL_ERROR: &str =
    "Une erreur technique est survenue. Veuillez réessayer dans quelques instants.";

/// Common causes of a mismatch, shown with [`PROFILE_MISMATCH`].
pub const MISMATCH_HINTS: [&str; 4] = [
    "Vérifiez les accents (é, è, ê, ç) : ils doivent être identiques à ceux du profil.",
    "Vérifiez l'orthographe exacte du nom et du prénom, y compris les tirets et les espaces.",
    "Les majuscules et minuscules n'ont pas d'importance.",
    "La date de naissance doit être au format AAAA-MM-JJ.",
];

/// Message plus optional hints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserMessage {
    pub message: String,
    pub hints: Vec<String>,
}

impl UserMessage {
    fn plain(message: &str) -> Self {
        Self {
            message: message.to_string(),
            hints: Vec::new(),
        }
    }
}

/// Rate limit message, in whole minutes (rounded up).
pub fn rate_limited(retry_after_secs: u64) -> String {
    let minutes = retry_after_secs.div_ceil(60).max(1);
    let unit = if minutes > 1 { "minutes" } else { "minute" };
    format!("Trop de tentatives. Veuillez réessayer dans {minutes} {unit}.")
}

/// Message for a successful access to `patients` dossiers.
pub fn granted(patients: usize) -> String {
    if patients > 1 {
        format!("{GRANTED} {patients} dossiers correspondent à ce code.")
    } else {
        GRANTED.to_string()
    }
}

/// Message for a refused attempt.
pub fn for_failure(failure: &AccessFailure) -> UserMessage {
    match failure {
        AccessFailure::InvalidCode => UserMessage::plain(INVALID_CODE),
        AccessFailure::ExpiredCode => UserMessage::plain(EXPIRED_CODE),
        AccessFailure::ProfileMismatch => UserMessage {
            message: PROFILE_MISMATCH.to_string(),
            hints: MISMATCH_HINTS.iter().map(|h| h.to_string()).collect(),
        },
        AccessFailure::RateLimited { retry_after_secs } => UserMessage {
            message: rate_limited(*retry_after_secs),
            hints: Vec::new(),
        },
        AccessFailure::Technical(_) => UserMessage::plain(TECHNICAL_ERROR),
    }
}

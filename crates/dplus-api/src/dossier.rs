//! # Dossiers
//!
//! After a grant, one [`Dossier`] per matched patient bundles the profile,
//! the readable directive contents and the documents. Dossiers are kept in
//! memory under a random id for a fixed time-to-live and are not returned
//! once expired.
//!
//! ## Directive envelopes
//!
//! Directive content may be stored as an AES-256-GCM envelope:
//!
//! ```json
//! { "alg": "A256GCM", "nonce": "<base64, 12 bytes>", "ciphertext": "<base64>" }
//! ```
//!
//! [`DossierCipher`] opens it. Without a key, or when the envelope does not
//! authenticate, the directive is shown as sealed with no content.

use std::sync::Arc;

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use dplus_core::{Directive, DirectiveId, MedicalDocument, Profile};
use rand_core::{OsRng, RngCore};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::access::AccessGrant;
use crate::state::Store;

/// AES-256 key length in bytes.
pub const KEY_LEN: usize = 32;

const NONCE_LEN: usize = 12;

/// `alg` value of an envelope.
pub const ENVELOPE_ALG: &str = "A256GCM";

#[derive(Error, Debug)]
pub enum CipherError {
    #[error("directive encryption failed")]
    Encrypt,

    #[error("directive decryption failed")]
    Decrypt,

    #[error("malformed envelope: {0}")]
    Envelope(String),

    #[error("directive content serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Symmetric cipher for directive content.
#[derive(Clone)]
pub struct DossierCipher {
    key: Arc<Zeroizing<[u8; KEY_LEN]>>,
}

impl std::fmt::Debug for DossierCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DossierCipher")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl DossierCipher {
    pub fn new(key: Zeroizing<[u8; KEY_LEN]>) -> Self {
        Self { key: Arc::new(key) }
    }

    fn aead(&self) -> Result<Aes256Gcm, CipherError> {
        Aes256Gcm::new_from_slice(self.key.as_slice()).map_err(|_| CipherError::Encrypt)
    }

    /// Seal `content` into an envelope with a fresh random nonce.
    pub fn encrypt(&self, content: &Value) -> Result<Value, CipherError> {
        let plaintext = Zeroizing::new(serde_json::to_vec(content)?);
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = self
            .aead()?
            .encrypt(nonce, plaintext.as_slice())
            .map_err(|_| CipherError::Encrypt)?;

        Ok(serde_json::json!({
            "alg": ENVELOPE_ALG,
            "nonce": BASE64.encode(nonce_bytes),
            "ciphertext": BASE64.encode(ciphertext),
        }))
    }

    /// Open an envelope produced by [`encrypt`](Self::encrypt).
    pub fn decrypt(&self, envelope: &Value) -> Result<Value, CipherError> {
        let field = |name: &str| {
            envelope
                .get(name)
                .and_then(Value::as_str)
                .ok_or_else(|| CipherError::Envelope(format!("missing '{name}'")))
        };
        let alg = field("alg")?;
        if alg != ENVELOPE_ALG {
            return Err(CipherError::Envelope(format!("unsupported alg '{alg}'")));
        }
        let nonce_raw = BASE64
            .decode(field("nonce")?)
            .map_err(|e| CipherError::Envelope(format!("nonce: {e}")))?;
        if nonce_raw.len() != NONCE_LEN {
            return Err(CipherError::Envelope(format!(
                "nonce must be {NONCE_LEN} bytes, got {}",
                nonce_raw.len()
            )));
        }
        let ciphertext = BASE64
            .decode(field("ciphertext")?)
            .map_err(|e| CipherError::Envelope(format!("ciphertext: {e}")))?;

        let plaintext = Zeroizing::new(
            self.aead()?
                .decrypt(Nonce::from_slice(&nonce_raw), ciphertext.as_ref())
                .map_err(|_| CipherError::Decrypt)?,
        );
        Ok(serde_json::from_slice(&plaintext)?)
    }
}

/// Whether `content` looks like an envelope rather than clear content.
pub fn is_envelope(content: &Value) -> bool {
    content.get("alg").and_then(Value::as_str) == Some(ENVELOPE_ALG)
        && content.get("nonce").is_some()
        && content.get("ciphertext").is_some()
}

/// A directive as shown in a dossier.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct DossierDirective {
    #[schema(value_type = String)]
    pub id: DirectiveId,
    pub created_at: DateTime<Utc>,
    /// Content could not be opened.
    pub sealed: bool,
    #[schema(value_type = Option<Object>)]
    pub content: Option<Value>,
}

/// Present a directive, opening its envelope when possible.
pub fn open_directive(directive: &Directive, cipher: Option<&DossierCipher>) -> DossierDirective {
    let content = if !is_envelope(&directive.content) {
        Some(directive.content.clone())
    } else {
        match cipher.map(|c| c.decrypt(&directive.content)) {
            Some(Ok(content)) => Some(content),
            Some(Err(e)) => {
                tracing::warn!(directive_id = %directive.id, "directive envelope not opened: {e}");
                None
            }
            None => None,
        }
    };

    DossierDirective {
        id: directive.id,
        created_at: directive.created_at,
        sealed: content.is_none(),
        content,
    }
}

/// Everything a professional sees for one patient.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Dossier {
    pub id: Uuid,
    #[schema(value_type = Object)]
    pub patient: Profile,
    pub directives: Vec<DossierDirective>,
    #[schema(value_type = Vec<Object>)]
    pub documents: Vec<MedicalDocument>,
    /// Masked code that released the dossier.
    pub code: String,
    pub assembled_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Dossier {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// In-memory dossier store with a fixed time-to-live.
#[derive(Debug, Clone)]
pub struct DossierStore {
    store: Store<Dossier>,
    ttl: Duration,
}

impl DossierStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            store: Store::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Build and keep one dossier per patient of `grant`.
    pub fn assemble(
        &self,
        grant: &AccessGrant,
        cipher: Option<&DossierCipher>,
        now: DateTime<Utc>,
    ) -> Vec<Dossier> {
        self.purge_expired(now);

        grant
            .patients
            .iter()
            .map(|patient| {
                let dossier = Dossier {
                    id: Uuid::new_v4(),
                    patient: patient.profile.clone(),
                    directives: patient
                        .directives
                        .iter()
                        .map(|d| open_directive(d, cipher))
                        .collect(),
                    documents: patient.documents.clone(),
                    code: grant.code.masked(),
                    assembled_at: now,
                    expires_at: now + self.ttl,
                };
                self.store.insert(dossier.id, dossier.clone());
                dossier
            })
            .collect()
    }

    /// Fetch a live dossier. An expired one is removed and not returned.
    pub fn get(&self, id: &Uuid, now: DateTime<Utc>) -> Option<Dossier> {
        let dossier = self.store.get(id)?;
        if dossier.is_expired(now) {
            self.store.remove(id);
            return None;
        }
        Some(dossier)
    }

    /// Drop expired dossiers. Returns how many were dropped.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        self.store.retain(|d| !d.is_expired(now))
    }

    pub fn active_count(&self) -> usize {
        self.store.len()
    }
}

//! # Application State
//!
//! Shared state for the Axum application, passed to all route handlers
//! via the `State` extractor.
//!
//! ## Architecture
//!
//! - **Directory**: storage seam, backed by the managed platform or kept in memory
//! - **Platform client**: also used directly by the auth relay routes
//! - **Access validator**: the institution access flow
//! - **Dossiers**: short-lived bundles assembled after a grant
//! - **Limiter / metrics**: shared with the middleware stack
//! - **Database pool**: optional, holds the hash-chained access ledger

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use dplus_core::CodeLifetime;
use dplus_platform_client::PlatformClient;
use parking_lot::RwLock;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::access::{AccessValidator, ValidationStrategy};
use crate::directory::{Directory, MemoryDirectory, PlatformDirectory};
use crate::dossier::{DossierCipher, DossierStore, KEY_LEN};
use crate::middleware::metrics::ApiMetrics;
use crate::middleware::rate_limit::{AttemptLimiter, RateLimitConfig, WindowPolicy};

// -- Generic In-Memory Store --------------------------------------------------

/// Thread-safe, cloneable in-memory key-value store.
///
/// All operations are synchronous (`parking_lot::RwLock`); the lock is
/// never held across `.await` points.
#[derive(Debug)]
pub struct Store<T: Clone + Send + Sync> {
    data: Arc<RwLock<HashMap<Uuid, T>>>,
}

impl<T: Clone + Send + Sync> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
        }
    }
}

impl<T: Clone + Send + Sync> Store<T> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Insert a record, returning the previous value if the key existed.
    pub fn insert(&self, id: Uuid, value: T) -> Option<T> {
        self.data.write().insert(id, value)
    }

    /// Retrieve a record by ID.
    pub fn get(&self, id: &Uuid) -> Option<T> {
        self.data.read().get(id).cloned()
    }

    /// Records for which `f` returns true.
    pub fn filter(&self, f: impl Fn(&T) -> bool) -> Vec<T> {
        self.data.read().values().filter(|v| f(v)).cloned().collect()
    }

    /// Update a record in place. Returns the updated record, or `None` if not found.
    pub fn update(&self, id: &Uuid, f: impl FnOnce(&mut T)) -> Option<T> {
        let mut guard = self.data.write();
        if let Some(entry) = guard.get_mut(id) {
            f(entry);
            Some(entry.clone())
        } else {
            None
        }
    }

    /// Remove a record by ID.
    pub fn remove(&self, id: &Uuid) -> Option<T> {
        self.data.write().remove(id)
    }

    /// Keep only the records for which `f` returns true. Returns how many were dropped.
    pub fn retain(&self, f: impl Fn(&T) -> bool) -> usize {
        let mut guard = self.data.write();
        let before = guard.len();
        guard.retain(|_, v| f(v));
        before - guard.len()
    }

    /// Return the number of records.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone + Send + Sync> Default for Store<T> {
    fn default() -> Self {
        Self::new()
    }
}

// -- Configuration ------------------------------------------------------------

/// An environment variable held a value that could not be used.
#[derive(Error, Debug)]
#[error("{var}: invalid value \"{value}\" ({reason})")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
    pub reason: String,
}

/// Application configuration.
///
/// Custom `Debug` redacts the auth token and the dossier key.
#[derive(Clone)]
pub struct AppConfig {
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Bearer secret. If `None`, authentication is disabled.
    pub auth_token: Option<String>,
    /// Validity window of newly generated institution codes.
    pub code_lifetime: CodeLifetime,
    /// How long an assembled dossier stays retrievable.
    pub dossier_ttl_secs: u64,
    /// 64 hex chars. Enables directive encryption and dossier decryption.
    pub dossier_key_hex: Option<Zeroizing<String>>,
    /// Authority / fallback selection.
    pub validation_strategy: ValidationStrategy,
    /// Sliding-window policies.
    pub rate_limits: RateLimitConfig,
    /// Serve `/metrics` and record HTTP metrics.
    pub metrics_enabled: bool,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .field("code_lifetime", &self.code_lifetime)
            .field("dossier_ttl_secs", &self.dossier_ttl_secs)
            .field(
                "dossier_key_hex",
                &self.dossier_key_hex.as_ref().map(|_| "[REDACTED]"),
            )
            .field("validation_strategy", &self.validation_strategy)
            .field("rate_limits", &self.rate_limits)
            .field("metrics_enabled", &self.metrics_enabled)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            auth_token: None,
            code_lifetime: CodeLifetime::default(),
            dossier_ttl_secs: 3600,
            dossier_key_hex: None,
            validation_strategy: ValidationStrategy::default(),
            rate_limits: RateLimitConfig::default(),
            metrics_enabled: true,
        }
    }
}

fn env_parse<T>(var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => {
            value.trim().parse().map_err(|e: T::Err| ConfigError {
                var,
                value,
                reason: e.to_string(),
            })
        }
        _ => Ok(default),
    }
}

impl AppConfig {
    /// Read configuration from the environment. Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let auth_token = std::env::var("AUTH_TOKEN").ok().filter(|t| !t.is_empty());
        let dossier_key_hex = std::env::var("DOSSIER_KEY_HEX")
            .ok()
            .filter(|k| !k.is_empty())
            .map(Zeroizing::new);

        let code_policy = defaults.rate_limits.institution_code;
        let institution_code = WindowPolicy::new(
            env_parse("ACCESS_MAX_ATTEMPTS", code_policy.max_attempts)?,
            env_parse("ACCESS_WINDOW_SECS", code_policy.window.as_secs())?,
        );

        Ok(Self {
            port: env_parse("PORT", defaults.port)?,
            auth_token,
            code_lifetime: CodeLifetime::days(env_parse(
                "INSTITUTION_CODE_TTL_DAYS",
                defaults.code_lifetime.as_days(),
            )?),
            dossier_ttl_secs: env_parse("DOSSIER_TTL_SECS", defaults.dossier_ttl_secs)?,
            dossier_key_hex,
            validation_strategy: env_parse(
                "ACCESS_VALIDATION_STRATEGY",
                defaults.validation_strategy,
            )?,
            rate_limits: RateLimitConfig {
                institution_code,
                ..defaults.rate_limits
            },
            metrics_enabled: env_parse("METRICS_ENABLED", defaults.metrics_enabled)?,
        })
    }
}

// -- Dossier key --------------------------------------------------------------

/// Decode a hex string into bytes.
pub(crate) fn hex_decode(s: &str) -> Result<Vec<u8>, String> {
    let s = s.trim();
    if s.len() % 2 != 0 {
        return Err(format!("hex string has odd length: {}", s.len()));
    }
    (0..s.len())
        .step_by(2)
        .map(|i| {
            s.get(i..i + 2)
                .ok_or_else(|| format!("non-ASCII character near position {i}"))
                .and_then(|pair| {
                    u8::from_str_radix(pair, 16)
                        .map_err(|e| format!("invalid hex at position {i}: {e}"))
                })
        })
        .collect()
}

/// `DOSSIER_KEY_HEX` could not be turned into a key.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DossierKeyError {
    #[error("DOSSIER_KEY_HEX invalid hex: {0}")]
    InvalidHex(String),

    #[error("DOSSIER_KEY_HEX must be exactly {} hex chars ({expected} bytes), got {actual} bytes", .expected * 2)]
    InvalidLength { expected: usize, actual: usize },
}

/// Build the dossier cipher from configuration, if a key is configured.
fn load_dossier_cipher(config: &AppConfig) -> Result<Option<DossierCipher>, DossierKeyError> {
    let Some(hex) = config.dossier_key_hex.as_ref() else {
        tracing::warn!(
            "DOSSIER_KEY_HEX not set; directives are stored in clear and \
             encrypted directives appear sealed in dossiers"
        );
        return Ok(None);
    };
    let bytes = Zeroizing::new(hex_decode(hex).map_err(DossierKeyError::InvalidHex)?);
    if bytes.len() != KEY_LEN {
        return Err(DossierKeyError::InvalidLength {
            expected: KEY_LEN,
            actual: bytes.len(),
        });
    }
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    key.copy_from_slice(&bytes);
    Ok(Some(DossierCipher::new(key)))
}

// -- AppState -----------------------------------------------------------------

/// Shared application state accessible to all route handlers.
///
/// Clone-friendly: every field is a handle over shared internals.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Storage seam used by the access flow and the management routes.
    pub directory: Arc<dyn Directory>,

    /// Managed platform client, when configured. The auth relay needs it.
    pub platform: Option<PlatformClient>,

    /// Institution access flow.
    pub validator: AccessValidator,

    /// Dossiers assembled after a grant, keyed by random id.
    pub dossiers: DossierStore,

    /// Directive encryption, when `DOSSIER_KEY_HEX` is set.
    pub cipher: Option<DossierCipher>,

    pub limiter: AttemptLimiter,
    pub metrics: ApiMetrics,

    /// PostgreSQL pool for the access ledger. `None` runs without a ledger.
    pub db_pool: Option<PgPool>,

    pub config: AppConfig,
}

impl AppState {
    /// Default configuration over an empty in-memory directory.
    pub fn new() -> Self {
        let config = AppConfig::default();
        Self::assemble(config, Arc::new(MemoryDirectory::new()), None, None, None)
    }

    /// Build state over an explicit directory, with no platform client and
    /// no database.
    pub fn with_directory(
        config: AppConfig,
        directory: Arc<dyn Directory>,
    ) -> Result<Self, DossierKeyError> {
        let cipher = load_dossier_cipher(&config)?;
        Ok(Self::assemble(config, directory, None, None, cipher))
    }

    /// Build state from configuration, an optional platform client, and an
    /// optional database pool.
    ///
    /// Without a platform client the directory is in memory (development mode).
    pub fn try_with_config(
        config: AppConfig,
        platform: Option<PlatformClient>,
        db_pool: Option<PgPool>,
    ) -> Result<Self, DossierKeyError> {
        let cipher = load_dossier_cipher(&config)?;
        let directory: Arc<dyn Directory> = match &platform {
            Some(client) => Arc::new(PlatformDirectory::new(client.clone())),
            None => {
                tracing::warn!("no platform client configured; using the in-memory directory");
                Arc::new(MemoryDirectory::new())
            }
        };
        Ok(Self::assemble(config, directory, platform, db_pool, cipher))
    }

    fn assemble(
        config: AppConfig,
        directory: Arc<dyn Directory>,
        platform: Option<PlatformClient>,
        db_pool: Option<PgPool>,
        cipher: Option<DossierCipher>,
    ) -> Self {
        let metrics = ApiMetrics::new();
        let limiter = AttemptLimiter::new(config.rate_limits.clone());
        let validator = AccessValidator::new(
            directory.clone(),
            config.validation_strategy,
            limiter.clone(),
            metrics.clone(),
            db_pool.clone(),
        );
        let dossiers =
            DossierStore::new(chrono::Duration::seconds(config.dossier_ttl_secs as i64));

        Self {
            directory,
            platform,
            validator,
            dossiers,
            cipher,
            limiter,
            metrics,
            db_pool,
            config,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

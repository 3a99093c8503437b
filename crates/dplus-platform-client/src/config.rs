//! Platform client configuration.
//!
//! One base URL serves every platform surface: table rows under
//! `/rest/v1`, RPC functions under `/rest/v1/rpc`, serverless functions
//! under `/functions/v1`, and auth under `/auth/v1`.

use url::Url;
use zeroize::Zeroizing;

/// Configuration for connecting to the managed backend.
///
/// Custom `Debug` implementation redacts both keys.
#[derive(Clone)]
pub struct PlatformConfig {
    /// Project base URL, e.g. `https://project.platform.example`.
    pub base_url: Url,
    /// Public (anon) API key. Always sent to the auth endpoints.
    pub anon_key: Zeroizing<String>,
    /// Service-role key. When present, table and RPC calls use it instead
    /// of the anon key.
    pub service_key: Option<Zeroizing<String>>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl std::fmt::Debug for PlatformConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformConfig")
            .field("base_url", &self.base_url)
            .field("anon_key", &"[REDACTED]")
            .field(
                "service_key",
                &self.service_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl PlatformConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `PLATFORM_URL` (required)
    /// - `PLATFORM_ANON_KEY` (required)
    /// - `PLATFORM_SERVICE_KEY` (optional)
    /// - `PLATFORM_TIMEOUT_SECS` (default: 30)
    pub fn from_env() -> Result<Self, ConfigError> {
        let raw_url = std::env::var("PLATFORM_URL").map_err(|_| ConfigError::MissingUrl)?;
        let base_url = Url::parse(&raw_url)
            .map_err(|e| ConfigError::InvalidUrl("PLATFORM_URL".to_string(), e.to_string()))?;
        let anon_key = std::env::var("PLATFORM_ANON_KEY")
            .map(Zeroizing::new)
            .map_err(|_| ConfigError::MissingAnonKey)?;
        let service_key = std::env::var("PLATFORM_SERVICE_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .map(Zeroizing::new);

        Ok(Self {
            base_url,
            anon_key,
            service_key,
            timeout_secs: std::env::var("PLATFORM_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
        })
    }

    /// Configuration pointing at a local mock server.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidUrl` if `base_url` does not parse.
    pub fn local_mock(base_url: &str, anon_key: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: Url::parse(base_url)
                .map_err(|e| ConfigError::InvalidUrl(base_url.to_string(), e.to_string()))?,
            anon_key: Zeroizing::new(anon_key.to_string()),
            service_key: None,
            timeout_secs: 5,
        })
    }

    /// Key used for table and RPC calls.
    pub fn table_key(&self) -> &str {
        self.service_key
            .as_ref()
            .map(|k| k.as_str())
            .unwrap_or_else(|| self.anon_key.as_str())
    }
}

/// Join a relative path onto the base URL regardless of trailing slashes.
pub(crate) fn join(base: &Url, path: &str) -> String {
    format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("PLATFORM_URL environment variable is required")]
    MissingUrl,
    #[error("PLATFORM_ANON_KEY environment variable is required")]
    MissingAnonKey,
    #[error("invalid header value for platform key")]
    InvalidKey,
    #[error("invalid URL for {0}: {1}")]
    InvalidUrl(String, String),
}

//! Platform client error types.

/// Errors from platform calls.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// HTTP transport error.
    #[error("HTTP error calling {endpoint}: {source}")]
    Http {
        endpoint: String,
        source: reqwest::Error,
    },
    /// The platform returned a non-2xx status.
    #[error("platform {endpoint} returned {status}: {body}")]
    Api {
        endpoint: String,
        status: u16,
        body: String,
    },
    /// Response deserialization failed.
    #[error("failed to deserialize response from {endpoint}: {source}")]
    Deserialization {
        endpoint: String,
        source: reqwest::Error,
    },
    /// A write that asks for the stored row back got none.
    #[error("platform {endpoint} returned no rows")]
    EmptyResult { endpoint: String },
    /// A serverless function reported failure.
    #[error("function {name} failed: {message}")]
    Function { name: String, message: String },
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] super::config::ConfigError),
}

impl PlatformError {
    /// HTTP status returned by the platform, if the call got that far.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

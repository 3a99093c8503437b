//! # dplus-platform-client -- Typed Rust client for the managed backend
//!
//! DirectivesPlus stores profiles, directives, documents and audit rows in
//! a managed backend-as-a-service platform. This crate is the only path
//! from the service to that platform:
//! - **Tables** via `/rest/v1/{table}` (profiles, directives, documents, access logs)
//! - **RPC** via `/rest/v1/rpc/{function}` (institution access validation)
//! - **Edge functions** via `/functions/v1/{name}` (OTP email, auth email, payment)
//! - **Auth** via `/auth/v1/*` (password, email OTP, session refresh)
//!
//! ## Keys
//!
//! Table and RPC calls authenticate with the service key when one is
//! configured, otherwise with the anon key. Auth and function calls always
//! use the anon key.

pub mod access_logs;
pub mod auth;
pub mod config;
pub mod directives;
pub mod documents;
pub mod error;
pub mod functions;
pub mod profiles;
pub(crate) mod rest;
pub(crate) mod retry;
pub mod rpc;

pub use auth::{AuthUser, Session};
pub use config::{ConfigError, PlatformConfig};
pub use error::PlatformError;
pub use rpc::{RpcProfileMatch, ValidateInstitutionAccessRequest};

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};

/// Top-level platform client. Holds sub-clients for each surface.
#[derive(Debug, Clone)]
pub struct PlatformClient {
    base_url: url::Url,
    health_http: reqwest::Client,
    profiles: profiles::ProfileClient,
    directives: directives::DirectiveClient,
    documents: documents::DocumentClient,
    access_logs: access_logs::AccessLogClient,
    rpc: rpc::RpcClient,
    functions: functions::FunctionClient,
    auth: auth::AuthClient,
}

/// Result of [`PlatformClient::health_check`].
#[derive(Debug, Clone, Default)]
pub struct HealthCheckResult {
    /// Surfaces that answered.
    pub reachable: Vec<String>,
    /// Surfaces that did not answer, with the reason.
    pub unreachable: Vec<(String, String)>,
}

impl HealthCheckResult {
    /// Whether every checked surface answered.
    pub fn all_healthy(&self) -> bool {
        self.unreachable.is_empty()
    }
}

fn http_client(key: &str, timeout_secs: u64) -> Result<reqwest::Client, PlatformError> {
    let mut headers = HeaderMap::new();
    let mut apikey = HeaderValue::from_str(key).map_err(|_| config::ConfigError::InvalidKey)?;
    apikey.set_sensitive(true);
    let mut bearer =
        HeaderValue::from_str(&format!("Bearer {key}")).map_err(|_| config::ConfigError::InvalidKey)?;
    bearer.set_sensitive(true);
    headers.insert("apikey", apikey);
    headers.insert(AUTHORIZATION, bearer);

    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .default_headers(headers)
        .build()
        .map_err(|e| PlatformError::Http {
            endpoint: "client_init".into(),
            source: e,
        })
}

impl PlatformClient {
    /// Create a platform client from configuration.
    pub fn new(config: PlatformConfig) -> Result<Self, PlatformError> {
        let table_http = http_client(config.table_key(), config.timeout_secs)?;
        let anon_http = http_client(config.anon_key.as_str(), config.timeout_secs)?;
        let base = config.base_url;

        Ok(Self {
            profiles: profiles::ProfileClient::new(table_http.clone(), base.clone()),
            directives: directives::DirectiveClient::new(table_http.clone(), base.clone()),
            documents: documents::DocumentClient::new(table_http.clone(), base.clone()),
            access_logs: access_logs::AccessLogClient::new(table_http.clone(), base.clone()),
            rpc: rpc::RpcClient::new(table_http, base.clone()),
            functions: functions::FunctionClient::new(anon_http.clone(), base.clone()),
            auth: auth::AuthClient::new(anon_http.clone(), base.clone()),
            health_http: anon_http,
            base_url: base,
        })
    }

    /// Access the profiles client.
    pub fn profiles(&self) -> &profiles::ProfileClient {
        &self.profiles
    }

    /// Access the directives client.
    pub fn directives(&self) -> &directives::DirectiveClient {
        &self.directives
    }

    /// Access the PDF and medical documents client.
    pub fn documents(&self) -> &documents::DocumentClient {
        &self.documents
    }

    /// Access the institution access log client.
    pub fn access_logs(&self) -> &access_logs::AccessLogClient {
        &self.access_logs
    }

    /// Access the RPC client.
    pub fn rpc(&self) -> &rpc::RpcClient {
        &self.rpc
    }

    /// Access the edge functions client.
    pub fn functions(&self) -> &functions::FunctionClient {
        &self.functions
    }

    /// Access the auth client.
    pub fn auth(&self) -> &auth::AuthClient {
        &self.auth
    }

    /// Check that the REST and auth surfaces answer.
    ///
    /// Any HTTP answer counts as reachable; only transport failures mark a
    /// surface unreachable. Health checks are not replayed.
    pub async fn health_check(&self) -> HealthCheckResult {
        let surfaces = [("rest", "rest/v1/"), ("auth", "auth/v1/health")];
        let mut result = HealthCheckResult::default();

        for (name, path) in surfaces {
            let url = config::join(&self.base_url, path);
            match self.health_http.get(&url).send().await {
                Ok(_) => result.reachable.push(name.to_string()),
                Err(e) => {
                    tracing::debug!(surface = name, "platform health check failed: {e}");
                    result.unreachable.push((name.to_string(), e.to_string()));
                }
            }
        }
        result
    }
}

//! Typed client for the `institution_access_logs` table.
//!
//! Append-only: the client offers insert and nothing else.

use dplus_core::AccessLogEntry;

use crate::config::join;
use crate::error::PlatformError;
use crate::rest::{self, REST_PREFIX, RETURN_MINIMAL};

const TABLE: &str = "institution_access_logs";

/// Client for institution access audit rows.
#[derive(Debug, Clone)]
pub struct AccessLogClient {
    http: reqwest::Client,
    base_url: url::Url,
}

impl AccessLogClient {
    pub(crate) fn new(http: reqwest::Client, base_url: url::Url) -> Self {
        Self { http, base_url }
    }

    /// Append one audit row.
    pub async fn insert(&self, entry: &AccessLogEntry) -> Result<(), PlatformError> {
        let endpoint = format!("POST /{TABLE}");
        let url = join(&self.base_url, &format!("{REST_PREFIX}/{TABLE}"));

        rest::execute(
            &endpoint,
            self.http
                .post(&url)
                .header("Prefer", RETURN_MINIMAL)
                .json(entry),
        )
        .await?;
        Ok(())
    }
}

//! Typed client for database RPC functions.
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | POST   | `/rest/v1/rpc/validate_institution_access` | Server-side code and identity check |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dplus_core::{DirectiveId, UserId};

use crate::config::join;
use crate::error::PlatformError;
use crate::rest::{self, REST_PREFIX};

/// Arguments of `validate_institution_access`.
#[derive(Debug, Clone, Serialize)]
pub struct ValidateInstitutionAccessRequest {
    /// Normalized institution code.
    pub institution_code: String,
    /// Submitted given name.
    pub patient_first_name: String,
    /// Submitted family name.
    pub patient_last_name: String,
    /// Submitted birth date (`YYYY-MM-DD`), if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_birth_date: Option<String>,
}

/// One patient matched by the RPC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcProfileMatch {
    pub user_id: UserId,
    #[serde(default)]
    pub directive_id: Option<DirectiveId>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub birth_date: Option<String>,
    #[serde(default)]
    pub institution_code_expires_at: Option<DateTime<Utc>>,
}

/// Client for RPC functions.
#[derive(Debug, Clone)]
pub struct RpcClient {
    http: reqwest::Client,
    base_url: url::Url,
}

impl RpcClient {
    pub(crate) fn new(http: reqwest::Client, base_url: url::Url) -> Self {
        Self { http, base_url }
    }

    /// Ask the platform to validate a code and identity.
    ///
    /// An empty list means no match; the function does not say why.
    pub async fn validate_institution_access(
        &self,
        req: &ValidateInstitutionAccessRequest,
    ) -> Result<Vec<RpcProfileMatch>, PlatformError> {
        let endpoint = "POST /rpc/validate_institution_access";
        let url = join(
            &self.base_url,
            &format!("{REST_PREFIX}/rpc/validate_institution_access"),
        );

        let resp = rest::execute(endpoint, self.http.post(&url).json(req)).await?;
        rest::decode(endpoint, resp).await
    }
}

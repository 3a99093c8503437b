//! Typed client for the `directives` table.
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | GET    | `/rest/v1/directives?institution_code=eq.{code}&institution_code_expires_at=not.is.null` | Lookup by institution code |
//! | GET    | `/rest/v1/directives?user_id=eq.{id}&order=created_at.desc` | List a patient's directives |
//! | GET    | `/rest/v1/directives?id=eq.{id}` | Get directive |
//! | POST   | `/rest/v1/directives` | Create directive |
//! | PATCH  | `/rest/v1/directives?id=eq.{id}` | Replace institution code |

use chrono::{DateTime, Utc};
use serde::Serialize;

use dplus_core::{Directive, DirectiveId, InstitutionCode, NewDirective, UserId};

use crate::config::join;
use crate::error::PlatformError;
use crate::rest::{self, REST_PREFIX, RETURN_REPRESENTATION};

/// Body of the institution code update.
#[derive(Debug, Serialize)]
struct InstitutionCodePatch<'a> {
    institution_code: &'a str,
    institution_code_expires_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Client for advance directives.
#[derive(Debug, Clone)]
pub struct DirectiveClient {
    http: reqwest::Client,
    base_url: url::Url,
}

impl DirectiveClient {
    pub(crate) fn new(http: reqwest::Client, base_url: url::Url) -> Self {
        Self { http, base_url }
    }

    fn table_url(&self) -> String {
        join(&self.base_url, &format!("{REST_PREFIX}/directives"))
    }

    /// Directives carrying `code` with a non-null expiry.
    ///
    /// Expired rows are returned too; the caller decides between
    /// "expired" and "valid".
    pub async fn find_by_institution_code(
        &self,
        code: &InstitutionCode,
    ) -> Result<Vec<Directive>, PlatformError> {
        let endpoint = format!("GET /directives?institution_code={}", code.masked());
        let url = self.table_url();
        let query = [
            ("institution_code", rest::eq(code.as_str())),
            ("institution_code_expires_at", "not.is.null".to_string()),
            ("select", "*".to_string()),
        ];

        let resp = rest::execute(&endpoint, self.http.get(&url).query(&query)).await?;
        rest::decode(&endpoint, resp).await
    }

    /// All directives of a patient, newest first.
    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Directive>, PlatformError> {
        let endpoint = format!("GET /directives?user_id={user_id}");
        let url = self.table_url();
        let query = [
            ("user_id", rest::eq(user_id)),
            ("order", "created_at.desc".to_string()),
            ("select", "*".to_string()),
        ];

        let resp = rest::execute(&endpoint, self.http.get(&url).query(&query)).await?;
        rest::decode(&endpoint, resp).await
    }

    /// Get a directive by id.
    pub async fn get(&self, id: DirectiveId) -> Result<Option<Directive>, PlatformError> {
        let endpoint = format!("GET /directives/{id}");
        let url = self.table_url();
        let query = [("id", rest::eq(id)), ("select", "*".to_string())];

        let resp = rest::execute(&endpoint, self.http.get(&url).query(&query)).await?;
        rest::decode_first(&endpoint, resp).await
    }

    /// Insert a directive and return the stored row.
    pub async fn create(&self, new: &NewDirective) -> Result<Directive, PlatformError> {
        let endpoint = "POST /directives";
        let url = self.table_url();

        let resp = rest::execute(
            endpoint,
            self.http
                .post(&url)
                .header("Prefer", RETURN_REPRESENTATION)
                .json(new),
        )
        .await?;

        rest::decode_first(endpoint, resp)
            .await?
            .ok_or_else(|| PlatformError::EmptyResult {
                endpoint: endpoint.into(),
            })
    }

    /// Replace the institution code of a directive.
    ///
    /// Returns the updated row, or `Ok(None)` when no directive has `id`.
    pub async fn set_institution_code(
        &self,
        id: DirectiveId,
        code: &InstitutionCode,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<Directive>, PlatformError> {
        let endpoint = format!("PATCH /directives/{id}");
        let url = self.table_url();
        let query = [("id", rest::eq(id))];
        let body = InstitutionCodePatch {
            institution_code: code.as_str(),
            institution_code_expires_at: expires_at,
            updated_at: Utc::now(),
        };

        let resp = rest::execute(
            &endpoint,
            self.http
                .patch(&url)
                .query(&query)
                .header("Prefer", RETURN_REPRESENTATION)
                .json(&body),
        )
        .await?;
        rest::decode_first(&endpoint, resp).await
    }
}

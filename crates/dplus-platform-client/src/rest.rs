//! Shared request plumbing for the REST, RPC, function and auth surfaces.
//!
//! Every call goes through [`execute`]: replay idempotent requests on
//! transport errors (see [`retry`]), then map a non-2xx status to
//! [`PlatformError::Api`] with the response body kept for diagnostics.

use serde::de::DeserializeOwned;

use crate::error::PlatformError;
use crate::retry;

/// Table rows live under this prefix.
pub(crate) const REST_PREFIX: &str = "rest/v1";

/// `Prefer` header asking the platform to echo written rows.
pub(crate) const RETURN_REPRESENTATION: &str = "return=representation";

/// `Prefer` header asking the platform not to echo written rows.
pub(crate) const RETURN_MINIMAL: &str = "return=minimal";

/// Equality filter value for a column query parameter.
pub(crate) fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{value}")
}

/// Send `request` and reject non-2xx responses.
pub(crate) async fn execute(
    endpoint: &str,
    request: reqwest::RequestBuilder,
) -> Result<reqwest::Response, PlatformError> {
    let resp = retry::send(request).await.map_err(|e| PlatformError::Http {
        endpoint: endpoint.to_string(),
        source: e,
    })?;

    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .unwrap_or_else(|e| format!("<failed to read response body: {e}>"));
        return Err(PlatformError::Api {
            endpoint: endpoint.to_string(),
            status,
            body,
        });
    }

    Ok(resp)
}

/// Decode a JSON body.
pub(crate) async fn decode<T: DeserializeOwned>(
    endpoint: &str,
    resp: reqwest::Response,
) -> Result<T, PlatformError> {
    resp.json().await.map_err(|e| PlatformError::Deserialization {
        endpoint: endpoint.to_string(),
        source: e,
    })
}

/// Decode a row array and keep the first row, if any.
pub(crate) async fn decode_first<T: DeserializeOwned>(
    endpoint: &str,
    resp: reqwest::Response,
) -> Result<Option<T>, PlatformError> {
    let rows: Vec<T> = decode(endpoint, resp).await?;
    Ok(rows.into_iter().next())
}

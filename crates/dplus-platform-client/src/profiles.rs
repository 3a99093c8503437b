//! Typed client for the `profiles` table.
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | GET    | `/rest/v1/profiles?id=eq.{id}` | Get profile by user id |

use dplus_core::{Profile, UserId};

use crate::config::join;
use crate::error::PlatformError;
use crate::rest::{self, REST_PREFIX};

/// Client for patient profiles.
#[derive(Debug, Clone)]
pub struct ProfileClient {
    http: reqwest::Client,
    base_url: url::Url,
}

impl ProfileClient {
    pub(crate) fn new(http: reqwest::Client, base_url: url::Url) -> Self {
        Self { http, base_url }
    }

    /// Fetch the profile of `user_id`. `Ok(None)` when no row exists.
    pub async fn get(&self, user_id: UserId) -> Result<Option<Profile>, PlatformError> {
        let endpoint = format!("GET /profiles/{user_id}");
        let url = join(&self.base_url, &format!("{REST_PREFIX}/profiles"));
        let query = [("id", rest::eq(user_id)), ("select", "*".to_string())];

        let resp = rest::execute(&endpoint, self.http.get(&url).query(&query)).await?;
        rest::decode_first(&endpoint, resp).await
    }
}

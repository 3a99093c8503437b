//! Typed client for the platform auth endpoints.
//!
//! Auth calls always carry the anon key, never the service key.
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | POST   | `/auth/v1/token?grant_type=password` | Password sign-in |
//! | POST   | `/auth/v1/otp` | Send an email OTP |
//! | POST   | `/auth/v1/verify` | Exchange an email OTP for a session |
//! | POST   | `/auth/v1/token?grant_type=refresh_token` | Refresh a session |

use serde::{Deserialize, Serialize};

use dplus_core::UserId;

use crate::config::join;
use crate::error::PlatformError;
use crate::rest;

const AUTH_PREFIX: &str = "auth/v1";

/// Authenticated account as reported with a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
}

/// Access and refresh tokens for a signed-in account.
///
/// Custom `Debug` implementation redacts both tokens.
#[derive(Clone, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    /// Seconds until `access_token` expires.
    pub expires_in: u64,
    #[serde(default)]
    pub token_type: Option<String>,
    pub user: AuthUser,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_in", &self.expires_in)
            .field("user", &self.user)
            .finish()
    }
}

#[derive(Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshGrant<'a> {
    refresh_token: &'a str,
}

#[derive(Serialize)]
struct OtpRequest<'a> {
    email: &'a str,
    create_user: bool,
}

#[derive(Serialize)]
struct VerifyRequest<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    email: &'a str,
    token: &'a str,
}

/// Client for sign-in and session management.
#[derive(Debug, Clone)]
pub struct AuthClient {
    http: reqwest::Client,
    base_url: url::Url,
}

impl AuthClient {
    pub(crate) fn new(http: reqwest::Client, base_url: url::Url) -> Self {
        Self { http, base_url }
    }

    fn url(&self, path: &str) -> String {
        join(&self.base_url, &format!("{AUTH_PREFIX}/{path}"))
    }

    /// Sign in with email and password.
    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, PlatformError> {
        let endpoint = "POST /auth/token?grant_type=password";
        let url = self.url("token");
        let body = PasswordGrant { email, password };

        let resp = rest::execute(
            endpoint,
            self.http
                .post(&url)
                .query(&[("grant_type", "password")])
                .json(&body),
        )
        .await?;
        rest::decode(endpoint, resp).await
    }

    /// Send a one-time code to `email`, creating the account if needed.
    pub async fn send_otp(&self, email: &str) -> Result<(), PlatformError> {
        let endpoint = "POST /auth/otp";
        let url = self.url("otp");
        let body = OtpRequest {
            email,
            create_user: true,
        };

        rest::execute(endpoint, self.http.post(&url).json(&body)).await?;
        Ok(())
    }

    /// Exchange an emailed one-time code for a session.
    pub async fn verify_otp(&self, email: &str, token: &str) -> Result<Session, PlatformError> {
        let endpoint = "POST /auth/verify";
        let url = self.url("verify");
        let body = VerifyRequest {
            kind: "email",
            email,
            token,
        };

        let resp = rest::execute(endpoint, self.http.post(&url).json(&body)).await?;
        rest::decode(endpoint, resp).await
    }

    /// Trade a refresh token for a new session.
    pub async fn refresh_session(&self, refresh_token: &str) -> Result<Session, PlatformError> {
        let endpoint = "POST /auth/token?grant_type=refresh_token";
        let url = self.url("token");
        let body = RefreshGrant { refresh_token };

        let resp = rest::execute(
            endpoint,
            self.http
                .post(&url)
                .query(&[("grant_type", "refresh_token")])
                .json(&body),
        )
        .await?;
        rest::decode(endpoint, resp).await
    }
}

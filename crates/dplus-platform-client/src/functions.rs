//! Typed client for serverless edge functions.
//!
//! Functions take a JSON body and answer `{ "success": true, ... }` or
//! `{ "error": "..." }`. Either an `error` field or a non-2xx status is
//! reported as [`PlatformError::Function`].
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | POST   | `/functions/v1/send-otp-email` | Email a one-time code |
//! | POST   | `/functions/v1/send-auth-email` | Email a confirmation or reset link |
//! | POST   | `/functions/v1/create-payment` | Create a payment intent |

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::join;
use crate::error::PlatformError;
use crate::retry;

const FUNCTIONS_PREFIX: &str = "functions/v1";

/// Outcome reported by the email functions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionReceipt {
    #[serde(default)]
    pub success: bool,
    #[serde(default, rename = "messageId")]
    pub message_id: Option<String>,
}

/// Body of `send-otp-email`.
#[derive(Debug, Clone, Serialize)]
pub struct OtpEmailRequest {
    pub email: String,
}

/// Which auth email to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthEmailKind {
    Signup,
    Recovery,
    MagicLink,
}

/// Body of `send-auth-email`.
#[derive(Debug, Clone, Serialize)]
pub struct AuthEmailRequest {
    pub email: String,
    #[serde(rename = "type")]
    pub kind: AuthEmailKind,
    #[serde(skip_serializing_if = "Option::is_none", rename = "redirectTo")]
    pub redirect_to: Option<String>,
}

/// Body of `create-payment`.
#[derive(Debug, Clone, Serialize)]
pub struct CreatePaymentRequest {
    /// Amount in minor units (cents).
    pub amount: u64,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Payment intent returned by `create-payment`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "clientSecret")]
    pub client_secret: String,
}

/// Error shape shared by all functions.
#[derive(Debug, Deserialize)]
struct FunctionErrorBody {
    error: Option<String>,
}

/// Client for edge functions.
#[derive(Debug, Clone)]
pub struct FunctionClient {
    http: reqwest::Client,
    base_url: url::Url,
}

impl FunctionClient {
    pub(crate) fn new(http: reqwest::Client, base_url: url::Url) -> Self {
        Self { http, base_url }
    }

    /// Email a one-time sign-in code.
    pub async fn send_otp_email(&self, email: &str) -> Result<FunctionReceipt, PlatformError> {
        let body = OtpEmailRequest {
            email: email.to_string(),
        };
        self.invoke("send-otp-email", &body).await
    }

    /// Email a signup confirmation, password reset or magic link.
    pub async fn send_auth_email(&self, req: &AuthEmailRequest) -> Result<FunctionReceipt, PlatformError> {
        self.invoke("send-auth-email", req).await
    }

    /// Create a payment intent.
    pub async fn create_payment(&self, req: &CreatePaymentRequest) -> Result<PaymentIntent, PlatformError> {
        self.invoke("create-payment", req).await
    }

    /// Call function `name` with a JSON body.
    pub async fn invoke<B, R>(&self, name: &str, body: &B) -> Result<R, PlatformError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let endpoint = format!("POST /functions/{name}");
        let url = join(&self.base_url, &format!("{FUNCTIONS_PREFIX}/{name}"));

        let resp = retry::send(self.http.post(&url).json(body))
            .await
            .map_err(|e| PlatformError::Http {
                endpoint: endpoint.clone(),
                source: e,
            })?;

        let status = resp.status();
        let bytes = resp.bytes().await.map_err(|e| PlatformError::Http {
            endpoint: endpoint.clone(),
            source: e,
        })?;

        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        if let Ok(FunctionErrorBody { error: Some(message) }) = serde_json::from_value(value.clone()) {
            return Err(PlatformError::Function {
                name: name.to_string(),
                message,
            });
        }
        if !status.is_success() {
            return Err(PlatformError::Function {
                name: name.to_string(),
                message: format!("status {}: {}", status.as_u16(), String::from_utf8_lossy(&bytes)),
            });
        }

        serde_json::from_value(value).map_err(|e| PlatformError::Function {
            name: name.to_string(),
            message: format!("unexpected response: {e}"),
        })
    }
}

//! # Sliding-Window Rate Limiting
//!
//! One limiter serves every throttled surface. Attempts are keyed by
//! `(kind, identifier)`: the normalized institution code or client address
//! for access validation, the email address for OTP sends, the client
//! address for plain request throttling. Each kind carries its own
//! [`WindowPolicy`].
//!
//! Timestamps of accepted attempts are kept per key; an attempt is refused
//! when `max_attempts` of them fall inside the trailing window. In-memory
//! only, so limits are per process.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::Request;
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use parking_lot::Mutex;

use crate::error::{ErrorBody, ErrorDetail};
use crate::extractors::client_ip;

/// What is being attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttemptKind {
    /// Institution code validation.
    InstitutionCode,
    /// One-time password email send.
    OtpEmail,
    /// Any API request, per client.
    Request,
}

impl AttemptKind {
    /// Label used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InstitutionCode => "institution_code",
            Self::OtpEmail => "otp_email",
            Self::Request => "request",
        }
    }
}

/// Maximum attempts within a trailing window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPolicy {
    /// Attempts allowed per window.
    pub max_attempts: u32,
    /// Window length.
    pub window: Duration,
}

impl WindowPolicy {
    /// Policy allowing `max_attempts` per `window_secs` seconds.
    pub fn new(max_attempts: u32, window_secs: u64) -> Self {
        Self {
            max_attempts,
            window: Duration::from_secs(window_secs),
        }
    }
}

/// Rate limiter configuration, one policy per attempt kind.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Institution code attempts per code and per client address.
    pub institution_code: WindowPolicy,
    /// OTP sends per email address.
    pub otp_email: WindowPolicy,
    /// API requests per client address.
    pub request: WindowPolicy,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            institution_code: WindowPolicy::new(5, 15 * 60),
            otp_email: WindowPolicy::new(3, 10 * 60),
            request: WindowPolicy::new(1000, 60),
        }
    }
}

impl RateLimitConfig {
    fn policy(&self, kind: AttemptKind) -> WindowPolicy {
        match kind {
            AttemptKind::InstitutionCode => self.institution_code,
            AttemptKind::OtpEmail => self.otp_email,
            AttemptKind::Request => self.request,
        }
    }
}

/// Checks between inline sweeps of idle keys.
pub const SWEEP_EVERY: u64 = 1024;

/// How long until the oldest attempt in the window expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryAfter(pub Duration);

impl RetryAfter {
    /// Whole seconds, rounded up, never zero.
    pub fn secs(&self) -> u64 {
        let secs = self.0.as_secs() + u64::from(self.0.subsec_nanos() > 0);
        secs.max(1)
    }
}

#[derive(Debug, Default)]
struct Windows {
    attempts: HashMap<(AttemptKind, String), VecDeque<Instant>>,
    checks: u64,
}

impl Windows {
    fn sweep(&mut self, config: &RateLimitConfig, now: Instant) {
        self.attempts.retain(|(kind, _), attempts| {
            let window = config.policy(*kind).window;
            attempts
                .back()
                .is_some_and(|last| now.saturating_duration_since(*last) < window)
        });
    }
}

/// Shared sliding-window limiter.
///
/// Keys whose attempts have all expired are dropped every
/// [`SWEEP_EVERY`] checks and on each [`purge_idle`](Self::purge_idle).
#[derive(Debug, Clone)]
pub struct AttemptLimiter {
    config: Arc<RateLimitConfig>,
    windows: Arc<Mutex<Windows>>,
}

impl AttemptLimiter {
    /// Create a limiter with the given config.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config: Arc::new(config),
            windows: Arc::new(Mutex::new(Windows::default())),
        }
    }

    /// Record an attempt for `key` if the window allows it.
    pub fn check(&self, kind: AttemptKind, key: &str) -> Result<(), RetryAfter> {
        self.check_at(kind, key, Instant::now())
    }

    /// [`check`](Self::check) with an explicit clock.
    pub fn check_at(&self, kind: AttemptKind, key: &str, now: Instant) -> Result<(), RetryAfter> {
        let policy = self.config.policy(kind);
        let mut windows = self.windows.lock();
        windows.checks += 1;
        if windows.checks % SWEEP_EVERY == 0 {
            windows.sweep(&self.config, now);
        }
        let attempts = windows.attempts.entry((kind, key.to_string())).or_default();

        while let Some(oldest) = attempts.front() {
            if now.saturating_duration_since(*oldest) >= policy.window {
                attempts.pop_front();
            } else {
                break;
            }
        }

        if attempts.len() >= policy.max_attempts as usize {
            let oldest = attempts.front().copied().unwrap_or(now);
            let elapsed = now.saturating_duration_since(oldest);
            return Err(RetryAfter(policy.window.saturating_sub(elapsed)));
        }

        attempts.push_back(now);
        Ok(())
    }

    /// Forget all attempts recorded for `key`.
    pub fn reset(&self, kind: AttemptKind, key: &str) {
        self.windows.lock().attempts.remove(&(kind, key.to_string()));
    }

    /// Drop keys whose attempts have all left their window.
    pub fn purge_idle(&self, now: Instant) {
        self.windows.lock().sweep(&self.config, now);
    }

    /// Number of tracked keys.
    pub fn tracked_keys(&self) -> usize {
        self.windows.lock().attempts.len()
    }
}

impl Default for AttemptLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

/// Build the 429 response shared by every throttled surface.
pub fn too_many_requests(message: &str, retry_after: RetryAfter) -> Response {
    let secs = retry_after.secs();
    let body = ErrorBody {
        error: ErrorDetail {
            code: "RATE_LIMITED".to_string(),
            message: message.to_string(),
            details: Some(serde_json::json!({ "retry_after_secs": secs })),
        },
    };
    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    response
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from(secs));
    response
}

/// Middleware that enforces the per-client request limit.
///
/// The key is the client address (`X-Forwarded-For`, `X-Real-IP`, or the
/// peer address); requests with none of these share the `"anonymous"` key.
pub async fn rate_limit_middleware(request: Request, next: Next) -> Response {
    let limiter = request.extensions().get::<AttemptLimiter>().cloned();

    if let Some(limiter) = limiter {
        let key = client_ip(request.headers(), request.extensions())
            .unwrap_or_else(|| "anonymous".to_string());

        if let Err(retry_after) = limiter.check(AttemptKind::Request, &key) {
            tracing::warn!(client = %key, "request rate limit exceeded");
            return too_many_requests("rate limit exceeded", retry_after);
        }
    }

    next.run(request).await
}

//! # dplus-api — Axum API Service for DirectivesPlus
//!
//! Owns the institution access contract: a healthcare professional submits
//! a patient's institution code plus the patient's identity, and receives
//! the patient's dossier or a precise refusal. Also serves the patient-side
//! directive and code management, and relays authentication to the managed
//! platform.
//!
//! ## API Surface
//!
//! | Prefix                         | Module                     | Auth |
//! |--------------------------------|----------------------------|------|
//! | `/v1/institution-access/*`     | [`routes::access`]         | institution |
//! | `/v1/dossiers/*`               | [`routes::access`]         | institution |
//! | `/v1/directives/*`             | [`routes::directives`]     | patient |
//! | `/v1/users/*/documents`        | [`routes::documents`]      | owner |
//! | `/v1/documents/*`              | [`routes::documents`]      | owner |
//! | `/v1/auth/*`                   | [`routes::auth`]           | none |
//! | `/health/*`, `/metrics`        | this module                | none |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → MetricsMiddleware → AuthMiddleware → RateLimitMiddleware → Handler
//! ```
//!
//! The auth relay skips `AuthMiddleware`.

pub mod access;
pub mod auth;
pub mod db;
pub mod directory;
pub mod dossier;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod state;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, StatusCode};
use axum::middleware::from_fn;
use axum::response::IntoResponse;
use axum::Router;

use crate::auth::AuthConfig;
use crate::state::AppState;

/// Assemble the full application router with all routes and middleware.
///
/// Health checks (`/health/*`) and `/metrics` are mounted outside the auth
/// middleware so they remain accessible without credentials.
pub fn app(state: AppState) -> Router {
    let auth_config = AuthConfig {
        token: state.config.auth_token.clone(),
    };
    let metrics_on = state.config.metrics_enabled;

    // Auth runs before rate limiting so unauthenticated requests are
    // rejected without consuming quota.
    let authenticated = Router::new()
        .merge(routes::access::router())
        .merge(routes::directives::router())
        .merge(routes::documents::router())
        .merge(openapi::router())
        .layer(from_fn(middleware::rate_limit::rate_limit_middleware))
        .layer(from_fn(auth::auth_middleware));

    let relay =
        routes::auth::router().layer(from_fn(middleware::rate_limit::rate_limit_middleware));

    let mut api = Router::new()
        .merge(authenticated)
        .merge(relay)
        .layer(DefaultBodyLimit::max(2 * 1024 * 1024));

    if metrics_on {
        api = api
            .layer(from_fn(middleware::metrics::metrics_middleware))
            .layer(axum::Extension(state.metrics.clone()));
    }

    let api = api
        .layer(middleware::tracing_layer::layer())
        .layer(axum::Extension(auth_config))
        .layer(axum::Extension(state.limiter.clone()))
        .with_state(state.clone());

    let mut unauthenticated = Router::new()
        .route("/health/liveness", axum::routing::get(liveness))
        .route("/health/readiness", axum::routing::get(readiness));

    if metrics_on {
        unauthenticated =
            unauthenticated.route("/metrics", axum::routing::get(prometheus_metrics));
    }

    let unauthenticated = unauthenticated.with_state(state);

    Router::new().merge(unauthenticated).merge(api)
}

/// GET /metrics — Prometheus scrape endpoint.
///
/// Drops expired dossiers and idle rate limiter keys, then refreshes their
/// gauges before encoding.
async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    state.dossiers.purge_expired(chrono::Utc::now());
    state
        .metrics
        .dossiers_active()
        .set(state.dossiers.active_count() as f64);
    state.limiter.purge_idle(std::time::Instant::now());
    state
        .metrics
        .rate_limit_keys()
        .set(state.limiter.tracked_keys() as f64);

    match state.metrics.gather_and_encode() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("metrics encoding failed: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

/// Liveness check: the process is running.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness check.
///
/// Checks the database (when configured) and the platform (when
/// configured). Returns 200 "ready" or 503 with a diagnostic message.
async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    if let Some(pool) = &state.db_pool {
        if let Err(e) = sqlx::query("SELECT 1").execute(pool).await {
            tracing::warn!("Database health check failed: {e}");
            return (StatusCode::SERVICE_UNAVAILABLE, "database unreachable".to_string())
                .into_response();
        }
    }

    if let Some(platform) = &state.platform {
        let result = platform.health_check().await;
        if !result.all_healthy() {
            let surfaces: Vec<String> = result
                .unreachable
                .iter()
                .map(|(name, err)| format!("{name}: {err}"))
                .collect();
            let msg = format!("platform unreachable: {}", surfaces.join("; "));
            tracing::warn!("{}", msg);
            return (StatusCode::SERVICE_UNAVAILABLE, msg).into_response();
        }
    }

    (StatusCode::OK, "ready".to_string()).into_response()
}

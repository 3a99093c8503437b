//! # Prometheus Metrics
//!
//! HTTP-level metrics (request counts, latency, errors) are recorded in
//! middleware. Access-flow counters (attempts by outcome and validation
//! path, audit write failures, authority fallbacks) are pushed by the
//! validator. The active dossier gauge is refreshed on each `/metrics`
//! scrape (pull model), see the metrics handler in `lib.rs`.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use prometheus::{
    core::Collector, Encoder, Gauge, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};

/// Shared metrics state backed by a Prometheus registry.
#[derive(Clone)]
pub struct ApiMetrics {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Registry,

    // -- HTTP middleware metrics (push model) --
    http_requests_total: IntCounterVec,
    http_request_duration_seconds: HistogramVec,
    http_errors_total: IntCounterVec,

    // -- Access flow (push model) --
    access_attempts_total: IntCounterVec,
    audit_write_failures_total: IntCounterVec,
    authority_fallbacks_total: IntCounter,

    // -- Pull model, updated on /metrics scrape --
    dossiers_active: Gauge,
    rate_limit_keys: Gauge,
}

impl std::fmt::Debug for ApiMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiMetrics")
            .field("requests", &self.requests())
            .field("errors", &self.errors())
            .field("access_attempts", &self.access_attempts())
            .finish()
    }
}

fn counter_total(counter: &IntCounterVec) -> u64 {
    let mut total = 0u64;
    for mf in &counter.collect() {
        for m in mf.get_metric() {
            total += m.get_counter().get_value() as u64;
        }
    }
    total
}

impl ApiMetrics {
    /// Create a new metrics instance with a fresh Prometheus registry.
    pub fn new() -> Self {
        let registry = Registry::new();

        let http_requests_total = IntCounterVec::new(
            Opts::new("dplus_http_requests_total", "Total HTTP requests"),
            &["method", "path", "status"],
        )
        .expect("metric can be created");

        let http_request_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "dplus_http_request_duration_seconds",
                "HTTP request duration in seconds",
            )
            .buckets(vec![
                0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ]),
            &["method", "path"],
        )
        .expect("metric can be created");

        let http_errors_total = IntCounterVec::new(
            Opts::new("dplus_http_errors_total", "Total HTTP errors (4xx and 5xx)"),
            &["method", "path", "status"],
        )
        .expect("metric can be created");

        let access_attempts_total = IntCounterVec::new(
            Opts::new(
                "dplus_access_attempts_total",
                "Institution access attempts by outcome and validation path",
            ),
            &["outcome", "path"],
        )
        .expect("metric can be created");

        let audit_write_failures_total = IntCounterVec::new(
            Opts::new(
                "dplus_audit_write_failures_total",
                "Access audit writes that failed and were swallowed",
            ),
            &["sink"],
        )
        .expect("metric can be created");

        let authority_fallbacks_total = IntCounter::new(
            "dplus_authority_fallbacks_total",
            "Validations that fell back from the authority to the table path",
        )
        .expect("metric can be created");

        let dossiers_active = Gauge::new(
            "dplus_dossiers_active",
            "Unexpired dossiers held in memory",
        )
        .expect("metric can be created");

        let rate_limit_keys = Gauge::new(
            "dplus_rate_limit_keys",
            "Rate limiter keys with attempts still in their window",
        )
        .expect("metric can be created");

        registry
            .register(Box::new(http_requests_total.clone()))
            .expect("metric can be registered");
        registry
            .register(Box::new(http_request_duration_seconds.clone()))
            .expect("metric can be registered");
        registry
            .register(Box::new(http_errors_total.clone()))
            .expect("metric can be registered");
        registry
            .register(Box::new(access_attempts_total.clone()))
            .expect("metric can be registered");
        registry
            .register(Box::new(audit_write_failures_total.clone()))
            .expect("metric can be registered");
        registry
            .register(Box::new(authority_fallbacks_total.clone()))
            .expect("metric can be registered");
        registry
            .register(Box::new(dossiers_active.clone()))
            .expect("metric can be registered");
        registry
            .register(Box::new(rate_limit_keys.clone()))
            .expect("metric can be registered");

        Self {
            inner: Arc::new(Inner {
                registry,
                http_requests_total,
                http_request_duration_seconds,
                http_errors_total,
                access_attempts_total,
                audit_write_failures_total,
                authority_fallbacks_total,
                dossiers_active,
                rate_limit_keys,
            }),
        }
    }

    /// Total request count (sum across all labels).
    pub fn requests(&self) -> u64 {
        counter_total(&self.inner.http_requests_total)
    }

    /// Total error count (sum across all labels).
    pub fn errors(&self) -> u64 {
        counter_total(&self.inner.http_errors_total)
    }

    /// Total institution access attempts (sum across all labels).
    pub fn access_attempts(&self) -> u64 {
        counter_total(&self.inner.access_attempts_total)
    }

    /// Total swallowed audit write failures.
    pub fn audit_write_failures(&self) -> u64 {
        counter_total(&self.inner.audit_write_failures_total)
    }

    /// Total authority-to-fallback switches.
    pub fn authority_fallbacks(&self) -> u64 {
        self.inner.authority_fallbacks_total.get()
    }

    /// Record an HTTP request (called by the middleware).
    fn record_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.inner
            .http_requests_total
            .with_label_values(&[method, path, &status_str])
            .inc();

        self.inner
            .http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);

        if status >= 400 {
            self.inner
                .http_errors_total
                .with_label_values(&[method, path, &status_str])
                .inc();
        }
    }

    /// Count one institution access attempt. `path` is `authority`,
    /// `fallback`, or `none` when the attempt never reached a lookup.
    pub fn record_access(&self, outcome: &str, path: &str) {
        self.inner
            .access_attempts_total
            .with_label_values(&[outcome, path])
            .inc();
    }

    /// Count a swallowed audit write failure for `sink` (`directory`, `ledger`).
    pub fn record_audit_failure(&self, sink: &str) {
        self.inner
            .audit_write_failures_total
            .with_label_values(&[sink])
            .inc();
    }

    /// Count a switch from the authority to the fallback path.
    pub fn record_authority_fallback(&self) {
        self.inner.authority_fallbacks_total.inc();
    }

    /// Access the active dossier gauge for updating.
    pub fn dossiers_active(&self) -> &Gauge {
        &self.inner.dossiers_active
    }

    /// Access the rate limiter key gauge for updating.
    pub fn rate_limit_keys(&self) -> &Gauge {
        &self.inner.rate_limit_keys
    }

    /// Gather all metrics and encode to Prometheus text format.
    pub fn gather_and_encode(&self) -> Result<String, String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| format!("failed to encode metrics: {e}"))?;
        String::from_utf8(buffer)
            .map_err(|e| format!("metrics encoding produced invalid UTF-8: {e}"))
    }
}

impl Default for ApiMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Normalize a request path by replacing UUID segments with `{id}`.
///
/// Keeps label cardinality bounded.
fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            // Standard UUID: 8-4-4-4-12 hex chars with hyphens
            if segment.len() == 36
                && segment.chars().enumerate().all(|(i, c)| {
                    if i == 8 || i == 13 || i == 18 || i == 23 {
                        c == '-'
                    } else {
                        c.is_ascii_hexdigit()
                    }
                })
            {
                "{id}"
            } else if segment.len() == 32 && segment.chars().all(|c| c.is_ascii_hexdigit()) {
                "{id}"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Middleware that records HTTP request metrics via Prometheus.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let metrics = request.extensions().get::<ApiMetrics>().cloned();
    let method = request.method().to_string();
    let path = normalize_path(request.uri().path());
    let start = Instant::now();

    let response = next.run(request).await;

    if let Some(m) = metrics {
        let duration = start.elapsed().as_secs_f64();
        let status = response.status().as_u16();
        m.record_request(&method, &path, status, duration);
    }

    response
}

//! # Middleware
//!
//! Tower layers applied to the API router: Prometheus request metrics,
//! sliding-window rate limiting, and request tracing.

pub mod metrics;
pub mod rate_limit;
pub mod tracing_layer;

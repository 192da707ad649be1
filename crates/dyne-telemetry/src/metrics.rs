//! Request, auth and stream metrics.
//!
//! Recorded through the `metrics` facade; installing an exporter is left to
//! the application. Without one, every call here is a no-op.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `dyne_requests_total` | Counter | `route`, `status` |
//! | `dyne_request_duration_seconds` | Histogram | `route` |
//! | `dyne_auth_failures_total` | Counter | `scheme`, `kind` |
//! | `dyne_stream_connections_active` | Gauge | - |

use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

/// Requests handled.
pub const REQUESTS_TOTAL: &str = "dyne_requests_total";
/// Request latency.
pub const REQUEST_DURATION: &str = "dyne_request_duration_seconds";
/// Authentication and authorization failures.
pub const AUTH_FAILURES_TOTAL: &str = "dyne_auth_failures_total";
/// Open persistent streams.
pub const STREAM_CONNECTIONS_ACTIVE: &str = "dyne_stream_connections_active";

/// Registers metric descriptions with the installed recorder.
pub fn describe_metrics() {
    describe_counter!(REQUESTS_TOTAL, "Total number of requests dispatched");
    describe_histogram!(REQUEST_DURATION, "Request handling time in seconds");
    describe_counter!(AUTH_FAILURES_TOTAL, "Requests rejected by an auth gate");
    describe_gauge!(STREAM_CONNECTIONS_ACTIVE, "Persistent stream sessions currently open");
}

/// Records a completed request. `route` is the route name, or `"unmatched"`.
pub fn record_request(route: &str, status_code: u16, duration: Duration) {
    counter!(
        REQUESTS_TOTAL,
        "route" => route.to_string(),
        "status" => status_code.to_string()
    )
    .increment(1);

    histogram!(REQUEST_DURATION, "route" => route.to_string()).record(duration.as_secs_f64());
}

/// Records an auth rejection. `kind` is `unauthenticated`, `malformed`,
/// `stale` or `unauthorized`.
pub fn record_auth_failure(scheme: &str, kind: &'static str) {
    counter!(
        AUTH_FAILURES_TOTAL,
        "scheme" => scheme.to_string(),
        "kind" => kind
    )
    .increment(1);
}

/// Holds the active-stream gauge up for its lifetime.
#[derive(Debug)]
pub struct StreamGuard {
    _private: (),
}

impl StreamGuard {
    /// Increments the gauge.
    #[must_use]
    pub fn new() -> Self {
        gauge!(STREAM_CONNECTIONS_ACTIVE).increment(1.0);
        Self { _private: () }
    }
}

impl Default for StreamGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        gauge!(STREAM_CONNECTIONS_ACTIVE).decrement(1.0);
    }
}

//! Metrics collection.
//!
//! # Metrics
//! - `http_client_requests_total` (counter): completed requests by method, status
//! - `http_client_request_duration_seconds` (histogram): latency by method
//! - `http_client_redirects_total` (counter): followed redirects
//! - `http_client_errors_total` (counter): failed requests by error kind

use std::time::Instant;

/// Record a request that produced a response.
pub fn record_request(method: &str, status: u16, started: Instant) {
    metrics::counter!(
        "http_client_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    metrics::histogram!(
        "http_client_request_duration_seconds",
        "method" => method.to_string()
    )
    .record(started.elapsed().as_secs_f64());
}

/// Record a failed request.
pub fn record_error(kind: &'static str) {
    metrics::counter!("http_client_errors_total", "kind" => kind).increment(1);
}

/// Record one followed redirect.
pub fn record_redirect() {
    metrics::counter!("http_client_redirects_total").increment(1);
}

/// Metrics and telemetry for Parlor
///
/// Provides Prometheus-compatible metrics for monitoring:
/// - HTTP request counts and latencies
/// - Conversation turns by outcome and relayed fragments
/// - Turn persistence failures
/// - Document indexing and style transfer calls

use axum::{
    extract::{MatchedPath, Request},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};
use std::time::Instant;

lazy_static! {
    // ========== HTTP Metrics ==========

    /// Total HTTP requests by method, path, and status
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "parlor_http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    /// HTTP request duration in seconds
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "parlor_http_request_duration_seconds",
        "HTTP request latencies in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    // ========== Conversation Metrics ==========

    /// Turns started
    pub static ref TURNS_STARTED_TOTAL: IntCounter = register_int_counter!(
        "parlor_turns_started_total",
        "Total number of conversation turns started"
    )
    .unwrap();

    /// Turns finished by outcome (completed, rejected, upstream_failure, storage_failure)
    pub static ref TURNS_FINISHED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "parlor_turns_finished_total",
        "Total number of conversation turns by outcome",
        &["outcome"]
    )
    .unwrap();

    /// Turns currently streaming
    pub static ref TURNS_ACTIVE: IntGauge = register_int_gauge!(
        "parlor_turns_active",
        "Number of conversation turns currently streaming"
    )
    .unwrap();

    /// Fragments relayed to callers
    pub static ref FRAGMENTS_RELAYED_TOTAL: IntCounter = register_int_counter!(
        "parlor_fragments_relayed_total",
        "Total number of reply fragments relayed to callers"
    )
    .unwrap();

    /// Failed turn-pair writes
    pub static ref PERSISTENCE_FAILURES_TOTAL: IntCounter = register_int_counter!(
        "parlor_persistence_failures_total",
        "Total number of turn pairs that could not be saved"
    )
    .unwrap();

    // ========== Collaborator Metrics ==========

    /// Documents indexed by status
    pub static ref DOCUMENTS_INDEXED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "parlor_documents_indexed_total",
        "Total number of document indexing attempts",
        &["status"]
    )
    .unwrap();

    /// Style transfers by style and status
    pub static ref STYLE_TRANSFERS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "parlor_style_transfers_total",
        "Total number of style transfer requests",
        &["style", "status"]
    )
    .unwrap();
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: f64) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration);
}

/// Record the start of a turn
pub fn record_turn_started() {
    TURNS_STARTED_TOTAL.inc();
    TURNS_ACTIVE.inc();
}

/// Record the end of a turn
pub fn record_turn_finished(outcome: &str) {
    TURNS_FINISHED_TOTAL.with_label_values(&[outcome]).inc();
    TURNS_ACTIVE.dec();
}

/// Record a turn rejected before generation
pub fn record_turn_rejected() {
    TURNS_FINISHED_TOTAL.with_label_values(&["rejected"]).inc();
}

/// Record relayed fragments
pub fn record_fragments(count: usize) {
    FRAGMENTS_RELAYED_TOTAL.inc_by(count as u64);
}

/// Record a failed turn-pair write
pub fn record_persistence_failure() {
    PERSISTENCE_FAILURES_TOTAL.inc();
}

/// Record a document indexing attempt
pub fn record_document_indexed(success: bool) {
    DOCUMENTS_INDEXED_TOTAL
        .with_label_values(&[if success { "success" } else { "failure" }])
        .inc();
}

/// Record a style transfer request
pub fn record_style_transfer(style: &str, success: bool) {
    STYLE_TRANSFERS_TOTAL
        .with_label_values(&[style, if success { "success" } else { "failure" }])
        .inc();
}

/// Middleware counting every request by its route template
pub async fn track_http_metrics(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;

    record_http_request(
        &method,
        &path,
        response.status().as_u16(),
        started.elapsed().as_secs_f64(),
    );
    response
}

/// GET /metrics
pub async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        render_metrics(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_http_request() {
        record_http_request("GET", "/health", 200, 0.05);
        let metrics = render_metrics();
        assert!(metrics.contains("parlor_http_requests_total"));
        assert!(metrics.contains("parlor_http_request_duration_seconds"));
    }

    #[test]
    fn test_record_turn_outcomes() {
        record_turn_started();
        record_fragments(2);
        record_turn_finished("completed");
        record_persistence_failure();

        let metrics = render_metrics();
        assert!(metrics.contains("parlor_turns_started_total"));
        assert!(metrics.contains("outcome=\"completed\""));
        assert!(metrics.contains("parlor_fragments_relayed_total"));
        assert!(metrics.contains("parlor_persistence_failures_total"));
    }

    #[test]
    fn test_record_collaborator_calls() {
        record_document_indexed(true);
        record_style_transfer("candy", false);

        let metrics = render_metrics();
        assert!(metrics.contains("parlor_documents_indexed_total"));
        assert!(metrics.contains("style=\"candy\""));
    }
}

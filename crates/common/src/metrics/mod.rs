//! Metrics and observability utilities
//!
//! Provides Prometheus metrics with SLO-aligned histograms
//! and standardized naming conventions.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all LinguaChat metrics
pub const METRICS_PREFIX: &str = "linguachat";

/// SLO-aligned histogram buckets for request latency (in seconds).
/// Chat requests include the model round trip, so the tail is long.
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005, // 5ms
    0.010, // 10ms
    0.025, // 25ms
    0.050, // 50ms
    0.100, // 100ms
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    2.500, // 2.5s
    5.000, // 5s
    10.00, // 10s
    30.00, // 30s
];

/// Buckets for remote model latency
pub const MODEL_BUCKETS: &[f64] = &[
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    2.000, // 2s
    4.000, // 4s
    8.000, // 8s
    15.00, // 15s
    30.00, // 30s
    60.00, // 60s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Session metrics
    describe_gauge!(
        format!("{}_sessions_active", METRICS_PREFIX),
        Unit::Count,
        "Sessions currently held in the registry"
    );

    describe_counter!(
        format!("{}_renders_total", METRICS_PREFIX),
        Unit::Count,
        "Views rendered, by screen"
    );

    // Chat metrics
    describe_counter!(
        format!("{}_messages_total", METRICS_PREFIX),
        Unit::Count,
        "User messages processed, by outcome"
    );

    describe_counter!(
        format!("{}_language_detections_total", METRICS_PREFIX),
        Unit::Count,
        "Language detections, by detected code"
    );

    // Model metrics
    describe_counter!(
        format!("{}_model_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total chat model requests"
    );

    describe_histogram!(
        format!("{}_model_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Chat model latency in seconds"
    );

    describe_counter!(
        format!("{}_model_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Total chat model errors"
    );

    // Persistence metrics
    describe_counter!(
        format!("{}_usage_writes_total", METRICS_PREFIX),
        Unit::Count,
        "Usage record writes, by status"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Helper to record chat model metrics
pub fn record_model_call(duration_secs: f64, model: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_model_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_model_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .record(duration_secs);
    } else {
        counter!(
            format!("{}_model_errors_total", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .increment(1);
    }
}

/// Count a processed message. `outcome` is `replied`, `error` or `unavailable`.
pub fn record_message(outcome: &str) {
    counter!(
        format!("{}_messages_total", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

pub fn record_detection(language: &str) {
    counter!(
        format!("{}_language_detections_total", METRICS_PREFIX),
        "language" => language.to_string()
    )
    .increment(1);
}

pub fn record_render(screen: &str) {
    counter!(
        format!("{}_renders_total", METRICS_PREFIX),
        "screen" => screen.to_string()
    )
    .increment(1);
}

pub fn record_usage_write(success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_usage_writes_total", METRICS_PREFIX),
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn set_active_sessions(count: usize) {
    gauge!(format!("{}_sessions_active", METRICS_PREFIX)).set(count as f64);
}

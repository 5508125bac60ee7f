/// Metrics and telemetry for the media service
///
/// Prometheus-compatible counters for blob operations, rendered at `/metrics`.

use lazy_static::lazy_static;
use prometheus::{
    register_gauge, register_histogram, register_int_counter_vec, Encoder, Gauge, Histogram,
    IntCounterVec, TextEncoder,
};
use std::time::Instant;

lazy_static! {
    /// Blob operations by operation and outcome
    pub static ref BLOB_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "blob_operations_total",
        "Total number of blob store operations",
        &["operation", "outcome"]
    )
    .unwrap();

    /// Size of stored uploads in bytes
    pub static ref BLOB_UPLOAD_BYTES: Histogram = register_histogram!(
        "blob_upload_bytes",
        "Size of uploaded blobs in bytes",
        vec![1024.0, 16384.0, 131072.0, 1048576.0, 4194304.0, 16777216.0, 67108864.0]
    )
    .unwrap();

    /// Application uptime in seconds
    pub static ref UPTIME_SECONDS: Gauge = register_gauge!(
        "uptime_seconds",
        "Application uptime in seconds"
    )
    .unwrap();

    static ref STARTED_AT: Instant = Instant::now();
}

/// Start the uptime clock
pub fn init() {
    lazy_static::initialize(&STARTED_AT);
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> String {
    UPTIME_SECONDS.set(STARTED_AT.elapsed().as_secs_f64());

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %e, "failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Record a blob store operation
pub fn record_blob_operation(operation: &str, outcome: &str) {
    BLOB_OPERATIONS_TOTAL
        .with_label_values(&[operation, outcome])
        .inc();
}

/// Record a stored upload
pub fn record_blob_upload(size: usize) {
    record_blob_operation("upload", "ok");
    BLOB_UPLOAD_BYTES.observe(size as f64);
}

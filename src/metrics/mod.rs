//! Metrics module
//!
//! Prometheus metrics for the storage engine, registered in the default
//! registry.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, Counter, CounterVec,
    Encoder, HistogramVec, TextEncoder,
};

lazy_static! {
    // Upload metrics
    pub static ref UPLOADS_TOTAL: CounterVec = register_counter_vec!(
        "gstore_uploads_total",
        "Total number of uploads",
        &["backend", "status"]
    ).unwrap();

    pub static ref UPLOAD_BYTES_TOTAL: Counter = register_counter!(
        "gstore_upload_bytes_total",
        "Total bytes written to the store"
    ).unwrap();

    pub static ref UPLOAD_DURATION: HistogramVec = register_histogram_vec!(
        "gstore_upload_duration_seconds",
        "Upload duration in seconds",
        &["status"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 60.0]
    ).unwrap();

    // Post-write metrics
    pub static ref VISIBILITY_CHANGES: CounterVec = register_counter_vec!(
        "gstore_visibility_changes_total",
        "Make-public requests after a successful write",
        &["status"]
    ).unwrap();

    // Removal metrics
    pub static ref REMOVALS_TOTAL: CounterVec = register_counter_vec!(
        "gstore_removals_total",
        "Object removals",
        &["status"]
    ).unwrap();

    // Error metrics
    pub static ref ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "gstore_errors_total",
        "Total errors",
        &["type"]
    ).unwrap();
}

fn status(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "failure"
    }
}

/// Record a successful upload
pub fn record_upload_success(backend: &str, bytes: u64, duration_secs: f64) {
    UPLOADS_TOTAL.with_label_values(&[backend, "success"]).inc();
    UPLOAD_BYTES_TOTAL.inc_by(bytes as f64);
    UPLOAD_DURATION
        .with_label_values(&["success"])
        .observe(duration_secs);
}

/// Record a failed upload
///
/// `backend` is `"unresolved"` when the upload failed before a client existed.
pub fn record_upload_failure(backend: &str, duration_secs: f64) {
    UPLOADS_TOTAL.with_label_values(&[backend, "failure"]).inc();
    UPLOAD_DURATION
        .with_label_values(&["failure"])
        .observe(duration_secs);
}

/// Record the outcome of a make-public request
pub fn record_visibility_change(success: bool) {
    VISIBILITY_CHANGES
        .with_label_values(&[status(success)])
        .inc();
}

/// Record the outcome of a removal
pub fn record_removal(success: bool) {
    REMOVALS_TOTAL.with_label_values(&[status(success)]).inc();
}

/// Record an error
pub fn record_error(error_type: &str) {
    ERRORS_TOTAL.with_label_values(&[error_type]).inc();
}

/// Render the default registry in the text exposition format
pub fn gather() -> String {
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_upload_success() {
        record_upload_success("memory", 1024, 0.01);
        // Just verify it doesn't panic
    }

    #[test]
    fn test_record_upload_failure() {
        record_upload_failure("unresolved", 0.001);
        // Just verify it doesn't panic
    }

    #[test]
    fn test_record_visibility_and_removal() {
        record_visibility_change(true);
        record_visibility_change(false);
        record_removal(false);
        // Just verify it doesn't panic
    }

    #[test]
    fn test_gather_contains_upload_metrics() {
        record_upload_success("memory", 1, 0.001);
        record_error("stream");

        let text = gather();
        assert!(text.contains("gstore_uploads_total"));
        assert!(text.contains("gstore_errors_total"));
    }
}

//! Query execution metrics

use std::time::Duration;

/// Record a completed facade operation
pub fn record_operation_success(operation: &str, duration: Duration) {
    metrics::counter!(
        "prism_es_query_requests_total",
        "operation" => operation.to_string(),
        "status" => "ok",
    )
    .increment(1);

    metrics::histogram!(
        "prism_es_query_duration_seconds",
        "operation" => operation.to_string(),
    )
    .record(duration.as_secs_f64());
}

/// Record a failed facade operation
pub fn record_operation_error(operation: &str, error_type: &str, duration: Duration) {
    metrics::counter!(
        "prism_es_query_requests_total",
        "operation" => operation.to_string(),
        "status" => "error",
    )
    .increment(1);

    metrics::counter!(
        "prism_es_query_errors_total",
        "operation" => operation.to_string(),
        "error_type" => error_type.to_string(),
    )
    .increment(1);

    metrics::histogram!(
        "prism_es_query_duration_seconds",
        "operation" => operation.to_string(),
    )
    .record(duration.as_secs_f64());
}

/// Record the number of chunks a result set was split into
pub fn record_chunk_plan(operation: &str, chunks: usize) {
    metrics::histogram!(
        "prism_es_query_chunks",
        "operation" => operation.to_string(),
    )
    .record(chunks as f64);
}

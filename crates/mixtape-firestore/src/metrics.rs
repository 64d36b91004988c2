//! Request metrics for the Firestore client.

use metrics::{counter, histogram};

/// Metric name constants.
pub mod names {
    /// Total requests by operation and HTTP status.
    pub const REQUESTS_TOTAL: &str = "mixtape_firestore_requests_total";

    /// Retry attempts by operation.
    pub const RETRIES_TOTAL: &str = "mixtape_firestore_retries_total";

    /// Request latency in seconds by operation.
    pub const LATENCY_SECONDS: &str = "mixtape_firestore_latency_seconds";
}

/// Record a completed request.
pub fn record_request(operation: &str, status: u16, latency_ms: f64) {
    counter!(
        names::REQUESTS_TOTAL,
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        names::LATENCY_SECONDS,
        "operation" => operation.to_string()
    )
    .record(latency_ms / 1000.0);
}

/// Record a retry attempt.
pub fn record_retry(operation: &str) {
    counter!(
        names::RETRIES_TOTAL,
        "operation" => operation.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names_are_namespaced() {
        assert!(names::REQUESTS_TOTAL.starts_with("mixtape_firestore_"));
        assert!(names::RETRIES_TOTAL.starts_with("mixtape_firestore_"));
        assert!(names::LATENCY_SECONDS.starts_with("mixtape_firestore_"));
    }
}

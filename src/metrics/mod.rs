//! Metrics module
//!
//! Prometheus counters and histograms for the relay and the upload client.

pub mod server;

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, Counter, CounterVec,
    HistogramVec,
};

lazy_static! {
    // Relay metrics
    pub static ref RELAY_REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "tsubame_relay_requests_total",
        "Relay requests by route and response status",
        &["route", "status"]
    ).expect("relay request counter registers once");

    pub static ref UPLOAD_BYTES_TOTAL: Counter = register_counter!(
        "tsubame_upload_bytes_total",
        "Total bytes forwarded to the provider"
    ).expect("upload bytes counter registers once");

    pub static ref PROVIDER_DURATION: HistogramVec = register_histogram_vec!(
        "tsubame_provider_duration_seconds",
        "Provider upload call duration in seconds",
        &["outcome"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    ).expect("provider duration histogram registers once");

    // Client metrics
    pub static ref CLIENT_UPLOADS_TOTAL: CounterVec = register_counter_vec!(
        "tsubame_client_uploads_total",
        "Client-side uploads by transport and outcome",
        &["transport", "status"]
    ).expect("client upload counter registers once");

    // Error metrics
    pub static ref ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "tsubame_errors_total",
        "Total errors",
        &["type"]
    ).expect("error counter registers once");
}

/// Record a handled relay request
pub fn record_relay_request(route: &str, status: u16) {
    RELAY_REQUESTS_TOTAL
        .with_label_values(&[route, &status.to_string()])
        .inc();
}

/// Record bytes accepted by the provider
pub fn record_upload_bytes(bytes: u64) {
    UPLOAD_BYTES_TOTAL.inc_by(bytes as f64);
}

/// Record a provider call and its outcome ("success", "rejected", "error")
pub fn record_provider_call(outcome: &str, duration_secs: f64) {
    PROVIDER_DURATION
        .with_label_values(&[outcome])
        .observe(duration_secs);
}

/// Record one client-side file upload
pub fn record_client_upload(transport: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    CLIENT_UPLOADS_TOTAL
        .with_label_values(&[transport, status])
        .inc();
}

/// Record an error
pub fn record_error(error_type: &str) {
    ERRORS_TOTAL.with_label_values(&[error_type]).inc();
}

//! Prometheus metrics collection for cfddns
//!
//! This module provides metrics collection for monitoring the daemon's behavior.

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

//==============================================================================
// Metrics
//==============================================================================

lazy_static! {
    /// Total number of confirmed DNS updates
    pub static ref DNS_UPDATES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "cfddns_dns_updates_total",
        "Total number of confirmed DNS updates",
        &["domain"]
    )
    .unwrap();

    /// Total number of per-domain failures
    pub static ref DNS_ERRORS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "cfddns_dns_errors_total",
        "Total number of per-domain DNS failures",
        &["domain", "stage"]
    )
    .unwrap();

    /// Public IP endpoints that failed to answer
    pub static ref IP_LOOKUP_FAILURES_TOTAL: IntCounter = register_int_counter!(
        "cfddns_ip_lookup_failures_total",
        "Total number of failed public IP endpoint lookups"
    )
    .unwrap();

    /// Current number of consecutive failing ticks
    pub static ref FAILURE_STREAK: IntGauge = register_int_gauge!(
        "cfddns_failure_streak",
        "Current number of consecutive failing ticks"
    )
    .unwrap();

    /// Unix time of the last clean tick
    pub static ref LAST_SUCCESS_TIMESTAMP: IntGauge = register_int_gauge!(
        "cfddns_last_success_timestamp_seconds",
        "Unix timestamp of the last tick without failures"
    )
    .unwrap();

    /// Reconciliation tick duration histogram
    pub static ref TICK_DURATION_SECONDS: Histogram = register_histogram!(
        "cfddns_tick_duration_seconds",
        "Reconciliation tick duration in seconds",
        vec![0.1, 0.5, 1.0, 5.0, 15.0, 60.0]
    )
    .unwrap();

    /// Notification deliveries by backend and outcome
    pub static ref NOTIFICATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "cfddns_notifications_total",
        "Total number of notification deliveries",
        &["backend", "outcome"]
    )
    .unwrap();
}

//==============================================================================
// Public Functions
//==============================================================================

/// Records a confirmed DNS update
pub fn record_dns_update(domain: &str) {
    DNS_UPDATES_TOTAL.with_label_values(&[domain]).inc();
}

/// Records a per-domain failure
///
/// # Arguments
///
/// * `domain` - Record name
/// * `stage` - Where it failed: "fetch", "missing" or "update"
pub fn record_dns_error(domain: &str, stage: &str) {
    DNS_ERRORS_TOTAL.with_label_values(&[domain, stage]).inc();
}

pub fn record_ip_lookup_failure() {
    IP_LOOKUP_FAILURES_TOTAL.inc();
}

/// Records a notification delivery outcome
///
/// # Arguments
///
/// * `backend` - "telegram" or "discord"
/// * `outcome` - "sent", "failed" or "skipped"
pub fn record_notification(backend: &str, outcome: &str) {
    NOTIFICATIONS_TOTAL
        .with_label_values(&[backend, outcome])
        .inc();
}

/// Starts a timer for one reconciliation tick
pub fn start_tick_timer() -> HistogramTimer {
    TICK_DURATION_SECONDS.start_timer()
}

/// Collects all metrics and returns them as text
///
/// # Returns
///
/// Returns the metrics in Prometheus text format, or an error when encoding
/// fails
pub fn gather_metrics() -> anyhow::Result<String> {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

//==============================================================================
// Types
//==============================================================================

/// Histogram timer for measuring duration
pub type HistogramTimer = prometheus::HistogramTimer;

//==============================================================================
// Tests
//==============================================================================

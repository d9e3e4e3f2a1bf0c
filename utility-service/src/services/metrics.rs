//! Prometheus metrics for utility-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, CounterVec, Gauge,
    HistogramVec, TextEncoder,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Bills created.
pub static BILLS_CREATED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "utility_bills_created_total",
        "Total number of utility bills created",
        &["status"]
    )
    .expect("Failed to register bills_created_total")
});

/// Usage recordings by outcome.
pub static USAGE_OPERATIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "utility_usage_operations_total",
        "Total number of usage recordings",
        &["status"]
    )
    .expect("Failed to register usage_operations_total")
});

/// Error counter for alerting.
pub static ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "utility_errors_total",
        "Total number of errors by type",
        &["error_type"]
    )
    .expect("Failed to register errors_total")
});

/// Remaining units on the active bill (0 when none is active).
pub static ACTIVE_BILL_REMAINING_UNITS: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "utility_active_bill_remaining_units",
        "Units remaining on the active utility bill"
    )
    .expect("Failed to register active_bill_remaining_units")
});

/// Store operation duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "utility_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&BILLS_CREATED_TOTAL);
    Lazy::force(&USAGE_OPERATIONS_TOTAL);
    Lazy::force(&ERRORS_TOTAL);
    Lazy::force(&ACTIVE_BILL_REMAINING_UNITS);
    Lazy::force(&DB_QUERY_DURATION);
}

pub fn record_bill_created(status: &str) {
    BILLS_CREATED_TOTAL.with_label_values(&[status]).inc();
}

pub fn record_usage_operation(status: &str) {
    USAGE_OPERATIONS_TOTAL.with_label_values(&[status]).inc();
}

pub fn record_error(error_type: &str) {
    ERRORS_TOTAL.with_label_values(&[error_type]).inc();
}

pub fn set_active_remaining_units(units: Decimal) {
    ACTIVE_BILL_REMAINING_UNITS.set(units.to_f64().unwrap_or_default());
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}

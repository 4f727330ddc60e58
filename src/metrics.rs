// Metrics and observability module
// This file handles collection of transport lifecycle, submission outcome
// and upstream latency metrics for the relay
//
// Numan Thabit 2025 Nov

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_gauge, CounterVec, HistogramVec,
    IntGauge,
};

pub static REQ_LATENCY: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "relay_request_latency_seconds",
        "latency for upstream calls",
        &["service", "method"]
    )
    .unwrap()
});

pub static REQ_ERRORS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "relay_request_errors_total",
        "errors by upstream",
        &["service", "method"]
    )
    .unwrap()
});

pub static TRANSPORTS_CONSTRUCTED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "relay_transports_constructed_total",
        "signing transports constructed by custody backend",
        &["kind"]
    )
    .unwrap()
});

pub static TRANSPORTS_DISPOSED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "relay_transports_disposed_total",
        "signing transports disposed by custody backend",
        &["kind"]
    )
    .unwrap()
});

pub static LIVE_TRANSPORTS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("relay_live_transports", "transports currently cached").unwrap()
});

pub static SUBMISSIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "relay_submissions_total",
        "submission attempts by outcome",
        &["outcome"]
    )
    .unwrap()
});

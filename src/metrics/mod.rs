//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Transaction submission and confirmation per operation
//! - Fee strategy fallbacks
//! - Content retrieval per source
//! - Faucet requests

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

lazy_static! {
    // Transaction metrics
    pub static ref TX_SUBMITTED: CounterVec = register_counter_vec!(
        "auraweave_transactions_submitted_total",
        "Total transactions accepted by the node",
        &["operation"]
    ).unwrap();

    pub static ref TX_CONFIRMED: CounterVec = register_counter_vec!(
        "auraweave_transactions_confirmed_total",
        "Total transactions included successfully",
        &["operation"]
    ).unwrap();

    pub static ref TX_FAILED: CounterVec = register_counter_vec!(
        "auraweave_transactions_failed_total",
        "Total failed operations by pipeline phase",
        &["operation", "phase"]
    ).unwrap();

    pub static ref TX_LATENCY: HistogramVec = register_histogram_vec!(
        "auraweave_transaction_latency_seconds",
        "Time from submission to inclusion",
        &["operation"],
        vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 240.0]
    ).unwrap();

    pub static ref GAS_FALLBACKS: CounterVec = register_counter_vec!(
        "auraweave_gas_estimate_fallbacks_total",
        "Gas estimates replaced by the operation default",
        &["operation"]
    ).unwrap();

    pub static ref FEE_FALLBACKS: CounterVec = register_counter_vec!(
        "auraweave_fee_strategy_fallbacks_total",
        "Fee strategies that failed and fell through",
        &["strategy"]
    ).unwrap();

    // Content metrics
    pub static ref CONTENT_FETCHES: CounterVec = register_counter_vec!(
        "auraweave_content_fetches_total",
        "Content retrieval attempts by source and outcome",
        &["source", "outcome"]
    ).unwrap();

    // Faucet metrics
    pub static ref FAUCET_REQUESTS: CounterVec = register_counter_vec!(
        "auraweave_faucet_requests_total",
        "Faucet requests by response status",
        &["status"]
    ).unwrap();
}

/// Render all registered metrics in the text exposition format
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

// Helper functions to record metrics

pub fn record_tx_submitted(operation: &str) {
    TX_SUBMITTED.with_label_values(&[operation]).inc();
}

pub fn record_tx_confirmed(operation: &str, latency_secs: f64) {
    TX_CONFIRMED.with_label_values(&[operation]).inc();
    TX_LATENCY.with_label_values(&[operation]).observe(latency_secs);
}

pub fn record_tx_failed(operation: &str, phase: &str) {
    TX_FAILED.with_label_values(&[operation, phase]).inc();
}

pub fn record_gas_fallback(operation: &str) {
    GAS_FALLBACKS.with_label_values(&[operation]).inc();
}

pub fn record_fee_fallback(strategy: &str) {
    FEE_FALLBACKS.with_label_values(&[strategy]).inc();
}

pub fn record_content_fetch(source: &str, ok: bool) {
    CONTENT_FETCHES
        .with_label_values(&[source, if ok { "ok" } else { "error" }])
        .inc();
}

pub fn record_faucet_request(status: u16) {
    FAUCET_REQUESTS
        .with_label_values(&[&status.to_string()])
        .inc();
}

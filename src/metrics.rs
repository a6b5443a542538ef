//! Prometheus metrics for the XRPL relayer
//!
//! Exposes metrics on /metrics endpoint for Prometheus scraping.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_int_counter, register_int_gauge,
    CounterVec, Gauge, IntCounter, IntGauge,
};

lazy_static! {
    // Relay loop
    pub static ref CYCLES: CounterVec = register_counter_vec!(
        "xrpl_relayer_cycles_total",
        "Relay cycles by direction and outcome",
        &["direction", "status"]
    ).unwrap();

    pub static ref LAST_SUCCESSFUL_CYCLE: Gauge = register_gauge!(
        "xrpl_relayer_last_successful_cycle_timestamp",
        "Unix timestamp of the last cycle without errors"
    ).unwrap();

    // XRPL scanning
    pub static ref TRANSACTIONS_SCANNED: IntCounter = register_int_counter!(
        "xrpl_relayer_transactions_scanned_total",
        "Validated bridge account transactions fetched from XRPL"
    ).unwrap();

    pub static ref SCAN_WATERMARK: IntGauge = register_int_gauge!(
        "xrpl_relayer_scan_watermark",
        "Lowest XRPL ledger index not scanned yet"
    ).unwrap();

    // Contract submissions
    pub static ref EVIDENCE_SUBMITTED: CounterVec = register_counter_vec!(
        "xrpl_relayer_evidence_submitted_total",
        "Evidence submissions by kind and outcome",
        &["kind", "status"]
    ).unwrap();

    pub static ref SIGNATURES_SUBMITTED: CounterVec = register_counter_vec!(
        "xrpl_relayer_signatures_submitted_total",
        "Operation signatures by operation type and outcome",
        &["operation_type", "status"]
    ).unwrap();

    // XRPL submissions
    pub static ref XRPL_SUBMISSIONS: CounterVec = register_counter_vec!(
        "xrpl_relayer_xrpl_submissions_total",
        "Multisigned transactions submitted to XRPL by outcome",
        &["outcome"]
    ).unwrap();

    pub static ref PENDING_OPERATIONS: IntGauge = register_int_gauge!(
        "xrpl_relayer_pending_operations",
        "Pending operations seen in the last cycle"
    ).unwrap();

    // Bridge contract
    pub static ref BRIDGE_HALTED: IntGauge = register_int_gauge!(
        "xrpl_relayer_bridge_halted",
        "1 while the bridge contract is halted"
    ).unwrap();

    pub static ref AVAILABLE_TICKETS: IntGauge = register_int_gauge!(
        "xrpl_relayer_available_tickets",
        "XRPL tickets the contract can still assign to operations"
    ).unwrap();

    // Errors
    pub static ref ERRORS: CounterVec = register_counter_vec!(
        "xrpl_relayer_errors_total",
        "Total number of errors",
        &["component", "type"]
    ).unwrap();

    // Health
    pub static ref UP: Gauge = register_gauge!(
        "xrpl_relayer_up",
        "Whether the relayer is up and running"
    ).unwrap();
}

fn status(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "failure"
    }
}

/// Record a completed scan
pub fn record_scan(transactions: usize, watermark: i64) {
    TRANSACTIONS_SCANNED.inc_by(transactions as u64);
    SCAN_WATERMARK.set(watermark);
}

/// Record a relay cycle of one direction
pub fn record_cycle(direction: &str, success: bool) {
    CYCLES.with_label_values(&[direction, status(success)]).inc();
}

/// Record an evidence submission
pub fn record_evidence(kind: &str, success: bool) {
    EVIDENCE_SUBMITTED
        .with_label_values(&[kind, status(success)])
        .inc();
}

/// Record a signature submission
pub fn record_signature(operation_type: &str, success: bool) {
    SIGNATURES_SUBMITTED
        .with_label_values(&[operation_type, status(success)])
        .inc();
}

/// Record the outcome of an XRPL submission
pub fn record_xrpl_submission(outcome: &str) {
    XRPL_SUBMISSIONS.with_label_values(&[outcome]).inc();
}

pub fn set_pending_operations(count: usize) {
    PENDING_OPERATIONS.set(count as i64);
}

pub fn record_bridge_status(halted: bool, available_tickets: usize) {
    BRIDGE_HALTED.set(i64::from(halted));
    AVAILABLE_TICKETS.set(available_tickets as i64);
}

/// Record an error
pub fn record_error(component: &str, error_type: &str) {
    ERRORS.with_label_values(&[component, error_type]).inc();
}

/// Record the end of a cycle in which both directions succeeded
pub fn record_successful_cycle() {
    LAST_SUCCESSFUL_CYCLE.set(chrono::Utc::now().timestamp() as f64);
}

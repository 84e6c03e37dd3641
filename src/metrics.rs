//! Prometheus metrics for the sync core.

use lazy_static::lazy_static;
use prometheus::{Counter, CounterVec, Encoder, Gauge, Opts, Registry, TextEncoder};
use std::sync::Once;

/// Metric name prefix for all inbox sync metrics
const PREFIX: &str = "inbox_sync";

lazy_static! {
    // Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Push connection
    pub static ref PUSH_EVENTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_push_events_total"), "Push events folded into the store"),
        &["outcome"]
    ).expect("Failed to create push_events_total metric");

    pub static ref PUSH_EVENTS_DROPPED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_push_events_dropped_total"), "Push frames dropped before reaching the store"),
        &["reason"]
    ).expect("Failed to create push_events_dropped_total metric");

    pub static ref RECONNECT_ATTEMPTS_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_reconnect_attempts_total"),
        "Push connection reconnect attempts"
    ).expect("Failed to create reconnect_attempts_total metric");

    pub static ref PUSH_CONNECTED: Gauge = Gauge::new(
        format!("{PREFIX}_push_connected"),
        "1 while the push connection is established"
    ).expect("Failed to create push_connected metric");

    // Optimistic mutations
    pub static ref MUTATIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_mutations_total"), "Optimistic mutations by outcome"),
        &["kind", "result"]
    ).expect("Failed to create mutations_total metric");

    // Session
    pub static ref SESSION_EXPIRED_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_session_expired_total"),
        "Session expiry signals fired"
    ).expect("Failed to create session_expired_total metric");
}

static INIT: Once = Once::new();

/// Register all metrics with the global registry. Safe to call repeatedly.
pub fn init_metrics() {
    INIT.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(PUSH_EVENTS_TOTAL.clone()),
            Box::new(PUSH_EVENTS_DROPPED_TOTAL.clone()),
            Box::new(RECONNECT_ATTEMPTS_TOTAL.clone()),
            Box::new(PUSH_CONNECTED.clone()),
            Box::new(MUTATIONS_TOTAL.clone()),
            Box::new(SESSION_EXPIRED_TOTAL.clone()),
        ];
        for collector in collectors {
            REGISTRY
                .register(collector)
                .expect("Failed to register metric");
        }
    });
}

pub fn record_push_event(outcome: &str) {
    PUSH_EVENTS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_push_dropped(reason: &str) {
    PUSH_EVENTS_DROPPED_TOTAL.with_label_values(&[reason]).inc();
}

pub fn record_reconnect_attempt() {
    RECONNECT_ATTEMPTS_TOTAL.inc();
}

pub fn set_push_connected(connected: bool) {
    PUSH_CONNECTED.set(if connected { 1.0 } else { 0.0 });
}

pub fn record_mutation(kind: &str, result: &str) {
    MUTATIONS_TOTAL.with_label_values(&[kind, result]).inc();
}

pub fn record_session_expired() {
    SESSION_EXPIRED_TOTAL.inc();
}

/// Text exposition of every registered metric.
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

use std::time::Duration;

use ::metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus HTTP exporter on :9000.
/// After this call, any metrics recorded via the `metrics` crate
/// macros are automatically exported at /metrics.
pub fn init_metrics_server() {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], 9000))
        .install()
        .expect("failed to start Prometheus metrics server");
}

// ── Sync metrics ─────────────────────────────────────────────────

pub fn record_fetch(source: &'static str, elapsed: Duration) {
    counter!("sync_fetches_total", "source" => source).increment(1);
    histogram!("sync_fetch_latency_ms", "source" => source)
        .record(elapsed.as_secs_f64() * 1000.0);
}

pub fn record_fetch_error(source: &'static str) {
    counter!("sync_fetch_errors_total", "source" => source).increment(1);
}

// ── Queue metrics ────────────────────────────────────────────────

pub fn record_event_enqueued(kind: &'static str) {
    counter!("events_enqueued_total", "kind" => kind).increment(1);
}

pub fn set_queue_depth(depth: usize) {
    gauge!("notification_queue_depth").set(depth as f64);
}

// ── Dispatch metrics ─────────────────────────────────────────────

pub fn record_event_delivered(kind: &'static str) {
    counter!("events_delivered_total", "kind" => kind).increment(1);
}

pub fn record_delivery_error(kind: &'static str) {
    counter!("event_delivery_errors_total", "kind" => kind).increment(1);
}

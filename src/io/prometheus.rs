//! Prometheus text exposition for the API counters
//!
//! Served at `/metrics` by the API server.

use crate::infra::metrics::{MetricsSummary, METRICS_BUCKET_BOUNDS, METRICS_NUM_BUCKETS};
use std::fmt::Write;

pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

fn write_metric(output: &mut String, name: &str, help: &str, typ: MetricType, val: u64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name} {val}");
}

/// Cumulative buckets plus sum and count
fn write_histogram(
    output: &mut String,
    name: &str,
    help: &str,
    buckets: &[u64; METRICS_NUM_BUCKETS],
    avg: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let mut cumulative = 0u64;
    for (i, bound) in METRICS_BUCKET_BOUNDS.iter().enumerate() {
        cumulative += buckets[i];
        let _ = writeln!(output, "{name}_bucket{{le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[METRICS_NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{le=\"+Inf\"}} {cumulative}");

    let count: u64 = buckets.iter().sum();
    let _ = writeln!(output, "{name}_sum {}", avg * count);
    let _ = writeln!(output, "{name}_count {count}");
}

pub fn format_prometheus_metrics(summary: &MetricsSummary) -> String {
    let mut output = String::with_capacity(4096);

    write_metric(
        &mut output,
        "transit_uptime_seconds",
        "Seconds since the API started",
        MetricType::Gauge,
        summary.uptime_secs,
    );
    write_metric(
        &mut output,
        "transit_http_requests_total",
        "HTTP requests handled",
        MetricType::Counter,
        summary.requests_total,
    );
    write_histogram(
        &mut output,
        "transit_http_request_latency_us",
        "HTTP request latency in microseconds",
        &summary.request_latency_buckets,
        summary.request_latency_avg_us,
    );
    write_metric(
        &mut output,
        "transit_http_request_latency_max_us",
        "Slowest HTTP request",
        MetricType::Gauge,
        summary.request_latency_max_us,
    );

    write_metric(
        &mut output,
        "transit_events_recorded_total",
        "Route events stored",
        MetricType::Counter,
        summary.events_recorded,
    );
    write_metric(
        &mut output,
        "transit_metrics_recorded_total",
        "Vehicle telemetry samples stored",
        MetricType::Counter,
        summary.metrics_recorded,
    );
    write_metric(
        &mut output,
        "transit_validation_failures_total",
        "Payloads rejected by validation",
        MetricType::Counter,
        summary.validation_failures,
    );
    write_metric(
        &mut output,
        "transit_store_errors_total",
        "Storage operations that failed",
        MetricType::Counter,
        summary.store_errors,
    );
    write_metric(
        &mut output,
        "transit_route_lookup_failures_total",
        "Best-effort route lookups that errored",
        MetricType::Counter,
        summary.route_lookup_failures,
    );
    write_metric(
        &mut output,
        "transit_events_expired_total",
        "Route events removed by retention",
        MetricType::Counter,
        summary.events_expired,
    );
    write_metric(
        &mut output,
        "transit_metrics_expired_total",
        "Telemetry samples removed by retention",
        MetricType::Counter,
        summary.metrics_expired,
    );

    output
}

//! Prometheus text exposition of scan metrics and parking state gauges

use crate::infra::metrics::{Metrics, MetricsSnapshot, METRICS_BUCKET_BOUNDS, METRICS_NUM_BUCKETS};
use crate::services::state::ParkingState;
use std::fmt::Write;

/// Prometheus metric type
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

/// Write a simple metric (counter or gauge) with site label
fn write_metric(
    output: &mut String,
    name: &str,
    help: &str,
    typ: MetricType,
    site: &str,
    val: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name}{{site=\"{site}\"}} {val}");
}

/// Write a gauge metric with f64 value
fn write_gauge_f64(output: &mut String, name: &str, help: &str, site: &str, val: f64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} gauge");
    let _ = writeln!(output, "{name}{{site=\"{site}\"}} {val:.6}");
}

/// Write a histogram metric with buckets, sum, and count
fn write_histogram(
    output: &mut String,
    name: &str,
    help: &str,
    site: &str,
    buckets: &[u64; METRICS_NUM_BUCKETS],
    bounds: &[u64; 10],
    sum: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let mut cumulative = 0u64;
    for (i, &bound) in bounds.iter().enumerate() {
        cumulative += buckets[i];
        let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[METRICS_NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"+Inf\"}} {cumulative}");

    let count: u64 = buckets.iter().sum();
    let _ = writeln!(output, "{name}_sum{{site=\"{site}\"}} {sum}");
    let _ = writeln!(output, "{name}_count{{site=\"{site}\"}} {count}");
}

/// Format metrics in Prometheus text exposition format
pub fn format_prometheus_metrics(metrics: &Metrics, state: &ParkingState, site_id: &str) -> String {
    let snapshot = metrics.snapshot();
    let mut output = String::with_capacity(4096);

    write_scan_metrics(&mut output, site_id, &snapshot);
    write_session_metrics(&mut output, site_id, &snapshot, state);

    output
}

fn write_scan_metrics(output: &mut String, site: &str, snapshot: &MetricsSnapshot) {
    write_metric(
        output,
        "parking_scans_total",
        "Total plate scans processed",
        MetricType::Counter,
        site,
        snapshot.scans_total,
    );
    write_metric(
        output,
        "parking_scan_fallback_total",
        "Scans resolved to the fallback plate",
        MetricType::Counter,
        site,
        snapshot.fallback_total,
    );
    write_metric(
        output,
        "parking_recognition_failures_total",
        "Recognition engine errors",
        MetricType::Counter,
        site,
        snapshot.recognition_failures_total,
    );
    write_metric(
        output,
        "parking_scan_busy_rejections_total",
        "Scans refused while another was in flight",
        MetricType::Counter,
        site,
        snapshot.busy_rejections_total,
    );
    write_histogram(
        output,
        "parking_recognition_latency_ms",
        "Recognition engine latency in milliseconds",
        site,
        &snapshot.latency_buckets,
        &METRICS_BUCKET_BOUNDS,
        snapshot.latency_sum_ms,
    );
    write_metric(
        output,
        "parking_recognition_latency_p99_ms",
        "99th percentile recognition latency",
        MetricType::Gauge,
        site,
        snapshot.latency_p99_ms,
    );
}

fn write_session_metrics(
    output: &mut String,
    site: &str,
    snapshot: &MetricsSnapshot,
    state: &ParkingState,
) {
    write_metric(
        output,
        "parking_entries_total",
        "Parking sessions opened",
        MetricType::Counter,
        site,
        snapshot.entries_total,
    );
    write_metric(
        output,
        "parking_exits_total",
        "Parking sessions closed",
        MetricType::Counter,
        site,
        snapshot.exits_total,
    );
    write_metric(
        output,
        "parking_active_sessions",
        "Currently open sessions",
        MetricType::Gauge,
        site,
        state.registry().len() as u64,
    );
    write_metric(
        output,
        "parking_history_records",
        "Closed sessions in the ledger",
        MetricType::Gauge,
        site,
        state.ledger().len() as u64,
    );
    write_gauge_f64(
        output,
        "parking_hourly_rate",
        "Hourly rate in effect",
        site,
        state.rate().hourly_rate(),
    );
    write_gauge_f64(
        output,
        "parking_revenue",
        "Sum of charges in the ledger",
        site,
        state.ledger().revenue(),
    );
}

//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics so the scan path never blocks on the reporter.
//!
//! NOTE: All atomics use Relaxed ordering: these are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Recognition latency bucket boundaries (milliseconds)
/// Buckets: ≤50, ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, >25600
const BUCKET_BOUNDS: [u64; 10] = [50, 100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600];
const NUM_BUCKETS: usize = 11;

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_ms: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_ms)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Swap all buckets to zero and return their values
#[inline]
fn swap_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = ((total as f64 * percentile).ceil() as u64).max(1);
    let mut cumulative = 0u64;

    // Last bucket uses 2x the previous bound
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [50, 100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Lock-free metrics collector for the scan pipeline
pub struct Metrics {
    /// Scans that reached the recognition engine (monotonic)
    scans_total: AtomicU64,
    /// Scans since last report (reset on report)
    scans_since_report: AtomicU64,
    /// Scans whose plate was replaced by the fallback identifier (monotonic)
    fallback_total: AtomicU64,
    /// Recognition engine errors (monotonic)
    recognition_failures_total: AtomicU64,
    /// Scans refused because another one was in flight (monotonic)
    busy_rejections_total: AtomicU64,
    /// Sessions opened (monotonic)
    entries_total: AtomicU64,
    /// Sessions closed (monotonic)
    exits_total: AtomicU64,
    /// Recognition latency histogram buckets (reset on report)
    latency_buckets: [AtomicU64; NUM_BUCKETS],
    /// Recognition latency histogram buckets since start (monotonic, for export)
    latency_buckets_total: [AtomicU64; NUM_BUCKETS],
    /// Sum of all recognition latencies in ms since start (monotonic, for export)
    latency_sum_total_ms: AtomicU64,
    /// Sum of recognition latencies in ms (reset on report)
    latency_sum_ms: AtomicU64,
    /// Max recognition latency in ms (reset on report)
    latency_max_ms: AtomicU64,
    /// Last report time (only accessed from reporter)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            scans_total: AtomicU64::new(0),
            scans_since_report: AtomicU64::new(0),
            fallback_total: AtomicU64::new(0),
            recognition_failures_total: AtomicU64::new(0),
            busy_rejections_total: AtomicU64::new(0),
            entries_total: AtomicU64::new(0),
            exits_total: AtomicU64::new(0),
            latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            latency_buckets_total: std::array::from_fn(|_| AtomicU64::new(0)),
            latency_sum_total_ms: AtomicU64::new(0),
            latency_sum_ms: AtomicU64::new(0),
            latency_max_ms: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Record a completed recognition call with its latency
    #[inline]
    pub fn record_recognition(&self, latency_ms: u64, failed: bool) {
        self.scans_total.fetch_add(1, Ordering::Relaxed);
        self.scans_since_report.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.recognition_failures_total.fetch_add(1, Ordering::Relaxed);
        }
        self.latency_sum_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.latency_sum_total_ms.fetch_add(latency_ms, Ordering::Relaxed);
        let bucket = bucket_index(latency_ms);
        self.latency_buckets[bucket].fetch_add(1, Ordering::Relaxed);
        self.latency_buckets_total[bucket].fetch_add(1, Ordering::Relaxed);
        update_atomic_max(&self.latency_max_ms, latency_ms);
    }

    #[inline]
    pub fn record_fallback(&self) {
        self.fallback_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_busy_rejection(&self) {
        self.busy_rejections_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_entry(&self) {
        self.entries_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_exit(&self) {
        self.exits_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn scans_total(&self) -> u64 {
        self.scans_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn fallback_total(&self) -> u64 {
        self.fallback_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn busy_rejections_total(&self) -> u64 {
        self.busy_rejections_total.load(Ordering::Relaxed)
    }

    /// Cumulative view for exporters. Reads only, so scraping never disturbs `report()`.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut latency_buckets = [0u64; NUM_BUCKETS];
        for (dst, bucket) in latency_buckets.iter_mut().zip(&self.latency_buckets_total) {
            *dst = bucket.load(Ordering::Relaxed);
        }

        MetricsSnapshot {
            scans_total: self.scans_total.load(Ordering::Relaxed),
            fallback_total: self.fallback_total.load(Ordering::Relaxed),
            recognition_failures_total: self.recognition_failures_total.load(Ordering::Relaxed),
            busy_rejections_total: self.busy_rejections_total.load(Ordering::Relaxed),
            entries_total: self.entries_total.load(Ordering::Relaxed),
            exits_total: self.exits_total.load(Ordering::Relaxed),
            latency_buckets,
            latency_sum_ms: self.latency_sum_total_ms.load(Ordering::Relaxed),
            latency_p99_ms: percentile_from_buckets(&latency_buckets, 0.99),
        }
    }

    /// Snapshot counters, resetting the periodic ones. Used by the log reporter only.
    pub fn report(&self, active_sessions: usize, history_len: usize) -> MetricsSummary {
        let elapsed_secs = {
            let mut last = self.last_report_time.lock();
            let secs = last.elapsed().as_secs_f64();
            *last = Instant::now();
            secs
        };

        let scans_since = self.scans_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.latency_sum_ms.swap(0, Ordering::Relaxed);
        let latency_max = self.latency_max_ms.swap(0, Ordering::Relaxed);
        let latency_buckets = swap_buckets(&self.latency_buckets);

        let scans_per_min =
            if elapsed_secs > 0.0 { scans_since as f64 * 60.0 / elapsed_secs } else { 0.0 };
        let avg_latency = if scans_since > 0 { latency_sum / scans_since } else { 0 };

        MetricsSummary {
            scans_total: self.scans_total.load(Ordering::Relaxed),
            scans_per_min,
            fallback_total: self.fallback_total.load(Ordering::Relaxed),
            recognition_failures_total: self.recognition_failures_total.load(Ordering::Relaxed),
            busy_rejections_total: self.busy_rejections_total.load(Ordering::Relaxed),
            entries_total: self.entries_total.load(Ordering::Relaxed),
            exits_total: self.exits_total.load(Ordering::Relaxed),
            latency_buckets,
            latency_avg_ms: avg_latency,
            latency_max_ms: latency_max,
            latency_p50_ms: percentile_from_buckets(&latency_buckets, 0.50),
            latency_p99_ms: percentile_from_buckets(&latency_buckets, 0.99),
            active_sessions,
            history_len,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Number of histogram buckets (exported for Prometheus formatting)
pub const METRICS_NUM_BUCKETS: usize = NUM_BUCKETS;

/// Exported bucket bounds for Prometheus formatting
pub const METRICS_BUCKET_BOUNDS: [u64; 10] = BUCKET_BOUNDS;

/// Monotonic counters and histogram since start, for Prometheus
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub scans_total: u64,
    pub fallback_total: u64,
    pub recognition_failures_total: u64,
    pub busy_rejections_total: u64,
    pub entries_total: u64,
    pub exits_total: u64,
    /// Recognition latency histogram buckets (ms), not cumulative across buckets
    pub latency_buckets: [u64; NUM_BUCKETS],
    pub latency_sum_ms: u64,
    pub latency_p99_ms: u64,
}

#[derive(Debug)]
pub struct MetricsSummary {
    pub scans_total: u64,
    pub scans_per_min: f64,
    pub fallback_total: u64,
    pub recognition_failures_total: u64,
    pub busy_rejections_total: u64,
    pub entries_total: u64,
    pub exits_total: u64,
    /// Recognition latency histogram buckets (ms)
    pub latency_buckets: [u64; NUM_BUCKETS],
    pub latency_avg_ms: u64,
    pub latency_max_ms: u64,
    pub latency_p50_ms: u64,
    pub latency_p99_ms: u64,
    pub active_sessions: usize,
    pub history_len: usize,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            scans_total = %self.scans_total,
            scans_per_min = format!("{:.1}", self.scans_per_min),
            fallback_total = %self.fallback_total,
            recognition_failures = %self.recognition_failures_total,
            busy_rejections = %self.busy_rejections_total,
            entries = %self.entries_total,
            exits = %self.exits_total,
            avg_latency_ms = %self.latency_avg_ms,
            p99_ms = %self.latency_p99_ms,
            active_sessions = %self.active_sessions,
            history = %self.history_len,
            "metrics"
        );
    }
}

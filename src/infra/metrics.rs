//! Lock-free service metrics
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//!
//! NOTE: All atomics use Relaxed ordering intentionally—these are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Prometheus-style exponential bucket boundaries (microseconds)
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
pub const METRICS_BUCKET_BOUNDS: [u64; 10] =
    [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
pub const METRICS_NUM_BUCKETS: usize = 11;

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_us: u64) -> usize {
    METRICS_BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
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

/// Load all bucket values without resetting
#[inline]
fn load_buckets(buckets: &[AtomicU64; METRICS_NUM_BUCKETS]) -> [u64; METRICS_NUM_BUCKETS] {
    let mut result = [0u64; METRICS_NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.load(Ordering::Relaxed);
    }
    result
}

/// Lock-free metrics collector for the API
pub struct Metrics {
    started_at: Instant,
    requests_total: AtomicU64,
    request_latency_sum_us: AtomicU64,
    request_latency_max_us: AtomicU64,
    request_latency_buckets: [AtomicU64; METRICS_NUM_BUCKETS],
    events_recorded: AtomicU64,
    metrics_recorded: AtomicU64,
    validation_failures: AtomicU64,
    store_errors: AtomicU64,
    route_lookup_failures: AtomicU64,
    events_expired: AtomicU64,
    metrics_expired: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            requests_total: AtomicU64::new(0),
            request_latency_sum_us: AtomicU64::new(0),
            request_latency_max_us: AtomicU64::new(0),
            request_latency_buckets: Default::default(),
            events_recorded: AtomicU64::new(0),
            metrics_recorded: AtomicU64::new(0),
            validation_failures: AtomicU64::new(0),
            store_errors: AtomicU64::new(0),
            route_lookup_failures: AtomicU64::new(0),
            events_expired: AtomicU64::new(0),
            metrics_expired: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_request(&self, latency_us: u64) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        self.request_latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        update_atomic_max(&self.request_latency_max_us, latency_us);
        self.request_latency_buckets[bucket_index(latency_us)].fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_event(&self) {
        self.events_recorded.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_metric(&self) {
        self.metrics_recorded.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_validation_failure(&self) {
        self.validation_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_store_error(&self) {
        self.store_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_route_lookup_failure(&self) {
        self.route_lookup_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_expired(&self, events: u64, metrics: u64) {
        self.events_expired.fetch_add(events, Ordering::Relaxed);
        self.metrics_expired.fetch_add(metrics, Ordering::Relaxed);
    }

    /// Consistent-enough snapshot of all counters
    pub fn snapshot(&self) -> MetricsSummary {
        let requests_total = self.requests_total.load(Ordering::Relaxed);
        let latency_sum = self.request_latency_sum_us.load(Ordering::Relaxed);
        MetricsSummary {
            uptime_secs: self.started_at.elapsed().as_secs(),
            requests_total,
            request_latency_avg_us: latency_sum.checked_div(requests_total).unwrap_or(0),
            request_latency_max_us: self.request_latency_max_us.load(Ordering::Relaxed),
            request_latency_buckets: load_buckets(&self.request_latency_buckets),
            events_recorded: self.events_recorded.load(Ordering::Relaxed),
            metrics_recorded: self.metrics_recorded.load(Ordering::Relaxed),
            validation_failures: self.validation_failures.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
            route_lookup_failures: self.route_lookup_failures.load(Ordering::Relaxed),
            events_expired: self.events_expired.load(Ordering::Relaxed),
            metrics_expired: self.metrics_expired.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub uptime_secs: u64,
    pub requests_total: u64,
    pub request_latency_avg_us: u64,
    pub request_latency_max_us: u64,
    pub request_latency_buckets: [u64; METRICS_NUM_BUCKETS],
    pub events_recorded: u64,
    pub metrics_recorded: u64,
    pub validation_failures: u64,
    pub store_errors: u64,
    pub route_lookup_failures: u64,
    pub events_expired: u64,
    pub metrics_expired: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            uptime_secs = %self.uptime_secs,
            requests = %self.requests_total,
            avg_latency_us = %self.request_latency_avg_us,
            max_latency_us = %self.request_latency_max_us,
            events = %self.events_recorded,
            metrics = %self.metrics_recorded,
            validation_failures = %self.validation_failures,
            store_errors = %self.store_errors,
            "metrics"
        );
    }
}

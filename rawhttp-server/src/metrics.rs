//! # Request Metrics
//!
//! Counters and a latency histogram for the demo server. Tests read them to
//! see how many requests actually reached the peer (for example, to count
//! retried attempts).
//!
//! ## Design Principles
//! 1. **Accumulator Pattern**: Atomic counters aggregate events without locks.
//! 2. **Fixed Buckets**: Histogram buckets live in one contiguous array.
//! 3. **Plain Snapshots**: Readers get owned structs, never live references.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Latency bucket upper bounds in microseconds.
pub const DEFAULT_LATENCY_BUCKETS_US: [u64; 12] =
    [50, 100, 250, 500, 1_000, 2_500, 5_000, 10_000, 25_000, 50_000, 100_000, 250_000];

/// Point-in-time view of the server counters.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    /// Requests parsed, whatever their outcome.
    pub requests_total: u64,
    /// Responses with status >= 400, including malformed requests.
    pub errors_total: u64,
    /// Requests currently being handled.
    pub inflight: u64,
    /// Connections accepted.
    pub connections_total: u64,
    pub latency: LatencySnapshot,
}

/// Point-in-time view of the latency histogram.
#[derive(Debug, Clone)]
pub struct LatencySnapshot {
    pub bounds_us: Vec<u64>,
    /// One count per bound plus a trailing overflow bucket.
    pub buckets: Vec<u64>,
    pub samples: u64,
    pub sum_us: u64,
}

impl LatencySnapshot {
    /// Mean latency, or zero without samples.
    pub fn mean(&self) -> Duration {
        match self.samples {
            0 => Duration::ZERO,
            n => Duration::from_micros(self.sum_us / n),
        }
    }
}

/// Shared metrics sink. `Relaxed` ordering suffices: fields are read
/// independently.
#[derive(Debug)]
pub struct Metrics {
    requests_total: AtomicU64,
    errors_total: AtomicU64,
    inflight: AtomicU64,
    connections_total: AtomicU64,
    latency: LatencyHistogram,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::with_latency_buckets(DEFAULT_LATENCY_BUCKETS_US.to_vec())
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates metrics with custom ascending bucket bounds (microseconds).
    pub fn with_latency_buckets(bounds_us: Vec<u64>) -> Self {
        Metrics {
            requests_total: AtomicU64::new(0),
            errors_total: AtomicU64::new(0),
            inflight: AtomicU64::new(0),
            connections_total: AtomicU64::new(0),
            latency: LatencyHistogram::new(bounds_us),
        }
    }

    pub fn record_connection(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Call once a request has been parsed.
    pub fn record_request_start(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        self.inflight.fetch_add(1, Ordering::Relaxed);
    }

    /// Call after the response was written.
    pub fn record_request_end(&self, latency: Duration) {
        self.inflight.fetch_sub(1, Ordering::Relaxed);
        self.latency.record(latency);
    }

    pub fn record_error(&self) {
        self.errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            errors_total: self.errors_total.load(Ordering::Relaxed),
            inflight: self.inflight.load(Ordering::Relaxed),
            connections_total: self.connections_total.load(Ordering::Relaxed),
            latency: self.latency.snapshot(),
        }
    }
}

/// Fixed-bucket latency histogram with a linear bucket scan.
#[derive(Debug)]
pub struct LatencyHistogram {
    bounds_us: Vec<u64>,
    buckets: Vec<AtomicU64>,
    sum_us: AtomicU64,
    samples: AtomicU64,
}

impl LatencyHistogram {
    /// Creates `bounds_us.len() + 1` buckets; the last one catches overflow.
    pub fn new(bounds_us: Vec<u64>) -> Self {
        let buckets = (0..=bounds_us.len()).map(|_| AtomicU64::new(0)).collect();
        LatencyHistogram {
            bounds_us,
            buckets,
            sum_us: AtomicU64::new(0),
            samples: AtomicU64::new(0),
        }
    }

    pub fn record(&self, latency: Duration) {
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.samples.fetch_add(1, Ordering::Relaxed);
        self.sum_us.fetch_add(micros, Ordering::Relaxed);

        let idx = self
            .bounds_us
            .iter()
            .position(|&bound| micros <= bound)
            .unwrap_or(self.bounds_us.len());
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> LatencySnapshot {
        LatencySnapshot {
            bounds_us: self.bounds_us.clone(),
            buckets: self.buckets.iter().map(|b| b.load(Ordering::Relaxed)).collect(),
            samples: self.samples.load(Ordering::Relaxed),
            sum_us: self.sum_us.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn histogram_places_samples_in_buckets() {
        let histogram = LatencyHistogram::new(vec![10, 100]);
        histogram.record(Duration::from_micros(5));
        histogram.record(Duration::from_micros(10));
        histogram.record(Duration::from_micros(50));
        histogram.record(Duration::from_millis(3));

        let snapshot = histogram.snapshot();
        assert_eq!(snapshot.buckets, vec![2, 1, 1]);
        assert_eq!(snapshot.samples, 4);
        assert_eq!(snapshot.sum_us, 5 + 10 + 50 + 3_000);
        assert_eq!(snapshot.mean(), Duration::from_micros(766));
    }

    #[test]
    fn counters_track_request_lifecycle() {
        let metrics = Metrics::new();
        metrics.record_connection();
        metrics.record_request_start();
        metrics.record_request_start();
        assert_eq!(metrics.snapshot().inflight, 2);

        metrics.record_request_end(Duration::from_micros(20));
        metrics.record_error();
        metrics.record_request_end(Duration::from_micros(40));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests_total, 2);
        assert_eq!(snapshot.errors_total, 1);
        assert_eq!(snapshot.inflight, 0);
        assert_eq!(snapshot.connections_total, 1);
        assert_eq!(snapshot.latency.samples, 2);
    }

    #[test]
    fn empty_histogram_has_zero_mean() {
        let metrics = Metrics::new();
        let latency = metrics.snapshot().latency;
        assert_eq!(latency.buckets.len(), DEFAULT_LATENCY_BUCKETS_US.len() + 1);
        assert_eq!(latency.mean(), Duration::ZERO);
    }
}

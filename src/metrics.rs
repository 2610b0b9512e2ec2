use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Latency percentiles in microseconds
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LatencySummary {
    pub p50_us: f64,
    pub p95_us: f64,
    pub p99_us: f64,
}

/// The most recent `capacity` latency samples, in nanoseconds
#[derive(Debug, Clone)]
pub struct LatencyWindow {
    samples: Arc<Mutex<VecDeque<u64>>>,
    capacity: usize,
}

impl LatencyWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&self, nanos: u64) {
        let mut samples = self.samples.lock();
        if samples.len() == self.capacity {
            samples.pop_front();
        }
        samples.push_back(nanos);
    }

    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.lock().is_empty()
    }

    /// Nearest-rank percentiles over the current window
    pub fn summary(&self) -> LatencySummary {
        let mut sorted: Vec<u64> = self.samples.lock().iter().copied().collect();
        if sorted.is_empty() {
            return LatencySummary::default();
        }
        sorted.sort_unstable();
        let rank = |p: f64| {
            let idx = ((sorted.len() as f64 * p).ceil() as usize).saturating_sub(1);
            sorted[idx] as f64 / 1000.0
        };
        LatencySummary {
            p50_us: rank(0.50),
            p95_us: rank(0.95),
            p99_us: rank(0.99),
        }
    }
}

/// Counters for one filter stage. Clones share the same counters, so a
/// handle taken before the stage is invoked observes its worker.
#[derive(Debug, Clone)]
pub struct StageMetrics {
    /// Records handed to the transform
    processed: Arc<AtomicU64>,
    /// Records lost to read failures
    failed: Arc<AtomicU64>,
    /// Per-record transform latency
    latency: LatencyWindow,
    start_time: Instant,
}

impl StageMetrics {
    pub fn new() -> Self {
        Self {
            processed: Arc::new(AtomicU64::new(0)),
            failed: Arc::new(AtomicU64::new(0)),
            latency: LatencyWindow::new(1000),
            start_time: Instant::now(),
        }
    }

    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_latency(&self, nanos: u64) {
        self.latency.record(nanos);
    }

    pub fn total_processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn total_failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Records per second since the metrics were created
    pub fn throughput_rps(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            0.0
        } else {
            self.total_processed() as f64 / elapsed
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_processed: self.total_processed(),
            total_failed: self.total_failed(),
            throughput_rps: self.throughput_rps(),
            latency: self.latency.summary(),
            elapsed: self.start_time.elapsed(),
        }
    }
}

impl Default for StageMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A snapshot of metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub total_processed: u64,
    pub total_failed: u64,
    pub throughput_rps: f64,
    pub latency: LatencySummary,
    pub elapsed: Duration,
}

impl MetricsSnapshot {
    pub fn format(&self) -> String {
        format!(
            "Processed: {}, Failed: {}, Throughput: {:.2} rec/s, \
             Latency P50: {:.2}µs, P95: {:.2}µs, P99: {:.2}µs, Elapsed: {:.2}s",
            self.total_processed,
            self.total_failed,
            self.throughput_rps,
            self.latency.p50_us,
            self.latency.p95_us,
            self.latency.p99_us,
            self.elapsed.as_secs_f64()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_summary() {
        let window = LatencyWindow::new(10);
        assert_eq!(window.summary(), LatencySummary::default());
        for i in 1..=10 {
            window.record(i * 1000);
        }
        let summary = window.summary();
        assert_eq!(summary.p50_us, 5.0);
        assert_eq!(summary.p95_us, 10.0);
        assert!(summary.p99_us >= summary.p95_us);
        assert_eq!(window.len(), 10);
    }

    #[test]
    fn test_window_drops_oldest() {
        let window = LatencyWindow::new(3);
        for nanos in [1000, 2000, 3000, 4000] {
            window.record(nanos);
        }
        assert_eq!(window.len(), 3);
        assert_eq!(window.summary().p50_us, 3.0);
    }

    #[test]
    fn test_clones_share_counters() {
        let metrics = StageMetrics::new();
        let handle = metrics.clone();
        for _ in 0..100 {
            metrics.record_processed();
            metrics.record_latency(1000);
        }
        metrics.record_failed();
        assert_eq!(handle.total_processed(), 100);
        assert_eq!(handle.total_failed(), 1);
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.total_processed, 100);
        assert!(snapshot.format().contains("Failed: 1"));
    }
}
